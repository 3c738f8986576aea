//! Portable pipeline definitions.
//!
//! A [`PipelineDefinition`] is the wire form of a pipeline: stage specs
//! only, no handles. Workers decode it and rebuild their own pipeline
//! through a [`StageRegistry`].

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorPolicy, PipelineError, SerializationError};
use crate::extract::DEFAULT_BATCH_SIZE;
use crate::pipeline::{LoadStep, Pipeline, PipelineBuilder, DEFAULT_PIPELINE_NAME};
use crate::stage::{StageRegistry, StageSpec};

fn default_name() -> String {
    DEFAULT_PIPELINE_NAME.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadStepDefinition {
    pub loader: StageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitioner: Option<StageSpec>,
    #[serde(default)]
    pub policy: ErrorPolicy,
    #[serde(default)]
    pub diagnostic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDefinition {
    Transform(StageSpec),
    Load(LoadStepDefinition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub extractor: StageSpec,
    #[serde(default)]
    pub on_extract_error: ErrorPolicy,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl PipelineDefinition {
    /// JSON encoding used to ship the definition to workers.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Encoding`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// # Errors
    ///
    /// Returns [`SerializationError::Encoding`] on malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Reconstruct a runnable pipeline, decoding every stage through
    /// `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] for unknown kinds or bad
    /// configs and [`PipelineError::Build`] for an incomplete pipeline.
    pub fn build(&self, registry: &StageRegistry) -> Result<Pipeline, PipelineError> {
        let mut builder = PipelineBuilder::new()
            .name(self.name.clone())
            .batch_size(self.batch_size)
            .on_extract_error(self.on_extract_error)
            .read_boxed(registry.extractor(&self.extractor)?);
        for step in &self.steps {
            builder = match step {
                StepDefinition::Transform(spec) => builder.transform_boxed(registry.transformer(spec)?),
                StepDefinition::Load(load) => {
                    let mut step = LoadStep::new(registry.loader(&load.loader)?).policy(load.policy);
                    if let Some(spec) = &load.partitioner {
                        step = step.partitioned(registry.partitioner(spec)?);
                    }
                    if load.diagnostic {
                        step = step.diagnostic();
                    }
                    builder.load_step(step)
                }
            };
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::r#ref;
    use crate::extract::RowsExtractor;
    use crate::load::{OutputConfig, OutputLoader};
    use crate::partition::ByEntries;
    use rowflow_types::{Entry, Row, Rows};

    fn pipeline() -> Pipeline {
        let rows = Rows::new(vec![Row::new(vec![
            Entry::integer("a", 100),
            Entry::integer("b", 200),
        ])
        .unwrap()]);
        Pipeline::builder()
            .name("math")
            .batch_size(10)
            .read(RowsExtractor::new(rows))
            .echo(OutputLoader::new(OutputConfig::default()))
            .with_entry("c", r#ref("a").plus("b"))
            .write_partitioned(OutputLoader::new(OutputConfig::default()), ByEntries::new(["a"]))
            .build()
            .unwrap()
    }

    #[test]
    fn definition_roundtrips_through_bytes_and_registry() {
        let definition = pipeline().to_definition().unwrap();
        let bytes = definition.to_bytes().unwrap();
        let decoded = PipelineDefinition::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, definition);

        let rebuilt = decoded.build(&StageRegistry::with_builtins()).unwrap();
        assert_eq!(rebuilt.name(), "math");
        assert_eq!(rebuilt.step_names(), vec!["output", "with_entry", "output"]);
        assert_eq!(rebuilt.to_definition().unwrap(), definition);
    }

    #[test]
    fn unknown_kind_fails_build() {
        let mut definition = pipeline().to_definition().unwrap();
        definition.extractor.kind = "kafka".into();
        let err = definition
            .build(&StageRegistry::with_builtins())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::Serialization(SerializationError::UnknownKind { .. })
        ));
    }

    #[test]
    fn yaml_shape_parses_with_defaults() {
        let yaml = r#"
extractor:
  kind: rows
  config:
    rows: []
steps:
  - transform:
      kind: filter
      config:
        condition: {expr: reference, name: keep}
  - load:
      loader: {kind: output}
      policy: skip
"#;
        let definition: PipelineDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definition.name, "pipeline");
        assert_eq!(definition.batch_size, 1_000);
        assert!(matches!(
            &definition.steps[1],
            StepDefinition::Load(LoadStepDefinition { policy: ErrorPolicy::Skip, diagnostic: false, .. })
        ));
        definition.build(&StageRegistry::with_builtins()).unwrap();
    }
}
