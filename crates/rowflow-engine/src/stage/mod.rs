//! Portable stage descriptions.
//!
//! Every serializable stage encodes to a [`StageSpec`]: a `kind` naming the
//! decoder in a [`StageRegistry`] and a JSON object holding only plain data.
//! Live handles never appear in a spec; stages reacquire them after decode.

pub mod registry;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::SerializationError;

pub use registry::StageRegistry;

/// JSON object holding a stage's configuration.
pub type StageConfig = serde_json::Map<String, serde_json::Value>;

/// Portable form of a stage: `{"kind": ..., "config": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub kind: String,
    #[serde(default)]
    pub config: StageConfig,
}

impl StageSpec {
    #[must_use]
    pub fn new(kind: impl Into<String>, config: StageConfig) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }

    /// Encode `config` under `kind`.
    ///
    /// # Errors
    ///
    /// See [`encode_config`].
    pub fn encode(kind: &str, config: &impl Serialize) -> Result<Self, SerializationError> {
        Ok(Self::new(kind, encode_config(kind, config)?))
    }

    /// Decode the config into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::InvalidConfig`] if the config does not
    /// match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        serde_json::from_value(serde_json::Value::Object(self.config.clone())).map_err(|e| {
            SerializationError::InvalidConfig {
                kind: self.kind.clone(),
                message: e.to_string(),
            }
        })
    }
}

/// Serialize a stage configuration to a JSON object.
///
/// # Errors
///
/// Returns [`SerializationError::Encoding`] if serialization fails and
/// [`SerializationError::NotAnObject`] if it yields anything but an object.
pub fn encode_config(kind: &str, config: &impl Serialize) -> Result<StageConfig, SerializationError> {
    match serde_json::to_value(config)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(SerializationError::NotAnObject(kind.to_string())),
    }
}

/// A stage whose entire configuration is its own serde form.
///
/// Implementors get `to_spec` and registry decoding for free through
/// [`ConfigStage::spec`] and the `decode_*` helpers in [`registry`].
pub trait ConfigStage: Serialize + DeserializeOwned {
    const KIND: &'static str;

    /// # Errors
    ///
    /// See [`encode_config`].
    fn spec(&self) -> Result<StageSpec, SerializationError> {
        StageSpec::encode(Self::KIND, self)
    }
}
