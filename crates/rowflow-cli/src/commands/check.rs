use std::path::Path;

use anyhow::{Context, Result};

use rowflow_engine::config::{parser, validator};
use rowflow_engine::StepDefinition;

/// Execute the `check` command: parse, validate and build without running.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    // 1. Parse pipeline definition
    let definition = parser::parse_definition(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    // 2. Validate every stage against the registry
    let registry = super::registry();
    validator::validate_definition(&definition, &registry)?;
    println!("Pipeline structure: OK");

    // 3. Build, which decodes every stage without opening resources
    let pipeline = definition
        .build(&registry)
        .with_context(|| format!("Failed to build pipeline '{}'", definition.name))?;

    println!("{:18} {}", "Extractor:", definition.extractor.kind);
    for (i, (step, name)) in definition.steps.iter().zip(pipeline.step_names()).enumerate() {
        let role = match step {
            StepDefinition::Transform(_) => "transform",
            StepDefinition::Load(load) if load.diagnostic => "echo",
            StepDefinition::Load(_) => "load",
        };
        println!("{:18} {role} {name}", format!("Step[{i}]:"));
    }

    println!("\nAll checks passed.");
    Ok(())
}
