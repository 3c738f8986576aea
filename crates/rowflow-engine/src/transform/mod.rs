//! Batch-to-batch transformation stages.
//!
//! Transformers run synchronously, strictly in registration order. A
//! stateless transformer gives the same output for a row no matter how the
//! stream is batched; a stateful one reports [`Transformer::is_stateful`]
//! and documents how it depends on batch order.

mod entries;
mod rows;

use rowflow_types::Rows;

use crate::errors::{SerializationError, TransformError, TransformErrorKind};
use crate::stage::StageSpec;

pub use entries::{DropEntries, Rename, Select, StructureUnpack, WithEntry};
pub use rows::{Filter, Limit, SortBy};

pub trait Transformer: Send {
    /// Stage name used in logs and errors.
    fn name(&self) -> &str;

    /// Transform one batch.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] when a row cannot be transformed. The
    /// pipeline treats this as fatal.
    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError>;

    fn is_stateful(&self) -> bool {
        false
    }

    /// Portable description of this transformer.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::NotSerializable`] for transformers
    /// built around closures or live state.
    fn to_spec(&self) -> Result<StageSpec, SerializationError>;
}

/// Transformer backed by a closure. Useful in tests and one-off
/// pipelines; it cannot cross a worker boundary.
pub struct CallbackTransformer<F> {
    name: String,
    callback: F,
}

impl<F> CallbackTransformer<F>
where
    F: FnMut(Rows) -> Result<Rows, TransformErrorKind> + Send,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> Transformer for CallbackTransformer<F>
where
    F: FnMut(Rows) -> Result<Rows, TransformErrorKind> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        (self.callback)(rows).map_err(|kind| TransformError::new(self.name.clone(), kind))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        Err(SerializationError::NotSerializable(self.name.clone()))
    }
}
