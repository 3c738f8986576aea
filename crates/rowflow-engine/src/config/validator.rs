//! Semantic validation for parsed pipeline definitions.

use anyhow::{bail, Result};

use crate::definition::{PipelineDefinition, StepDefinition};
use crate::errors::{SerializationError, StageRole};
use crate::partition::HashBuckets;
use crate::stage::{ConfigStage, StageRegistry, StageSpec};

/// Record the decode failure of one stage spec, if any.
fn check_decodes<T>(
    decoded: Result<T, SerializationError>,
    role: StageRole,
    context: &str,
    errors: &mut Vec<String>,
) {
    if let Err(err) = decoded {
        errors.push(format!("{context}: invalid {role}: {err}"));
    }
}

fn validate_partitioner(spec: &StageSpec, context: &str, errors: &mut Vec<String>) {
    if spec.kind != HashBuckets::KIND {
        return;
    }
    if let Ok(buckets) = spec.decode::<HashBuckets>() {
        if buckets.buckets == 0 {
            errors.push(format!("{context}: hash_buckets needs at least 1 bucket"));
        }
        if buckets.entries.is_empty() {
            errors.push(format!("{context}: hash_buckets needs at least one entry"));
        }
    }
}

/// Validate a parsed pipeline definition against the stages `registry`
/// can decode. Returns `Ok(())` if valid, Err with all validation errors
/// if not.
///
/// # Errors
///
/// Returns an error listing every validation failure found.
pub fn validate_definition(definition: &PipelineDefinition, registry: &StageRegistry) -> Result<()> {
    let mut errors = Vec::new();

    if definition.name.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if definition.batch_size == 0 {
        errors.push("batch_size must be at least 1".to_string());
    }

    check_decodes(
        registry.extractor(&definition.extractor),
        StageRole::Extractor,
        "extractor",
        &mut errors,
    );

    let mut has_loader = false;
    for (i, step) in definition.steps.iter().enumerate() {
        match step {
            StepDefinition::Transform(spec) => check_decodes(
                registry.transformer(spec),
                StageRole::Transformer,
                &format!("steps[{i}]"),
                &mut errors,
            ),
            StepDefinition::Load(load) => {
                let context = format!("steps[{i}]");
                has_loader |= !load.diagnostic;
                check_decodes(
                    registry.loader(&load.loader),
                    StageRole::Loader,
                    &context,
                    &mut errors,
                );
                if let Some(spec) = &load.partitioner {
                    check_decodes(
                        registry.partitioner(spec),
                        StageRole::Partitioner,
                        &context,
                        &mut errors,
                    );
                    validate_partitioner(spec, &context, &mut errors);
                }
            }
        }
    }

    if !has_loader {
        errors.push("Pipeline must define at least one non-diagnostic load step".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}
