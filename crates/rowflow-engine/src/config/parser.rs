//! Pipeline definition YAML parsing with environment variable substitution.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::definition::PipelineDefinition;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = BTreeSet::new();
    let substituted = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            missing.insert(cap[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().collect();
        anyhow::bail!("Missing environment variable(s): {}", names.join(", "));
    }
    Ok(substituted.into_owned())
}

/// Parse a pipeline definition from YAML (after env var substitution).
/// JSON is valid YAML, so JSON definitions parse here too.
///
/// # Errors
///
/// Returns an error if env var substitution fails or the document is invalid.
pub fn parse_definition_str(yaml_str: &str) -> Result<PipelineDefinition> {
    let substituted = substitute_env_vars(yaml_str)?;
    let definition: PipelineDefinition =
        serde_yaml::from_str(&substituted).context("Failed to parse pipeline definition")?;
    Ok(definition)
}

/// Parse a pipeline definition file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content is invalid.
pub fn parse_definition(path: &Path) -> Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    parse_definition_str(&content)
}
