use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use rowflow_engine::config::{parser, validator};
use rowflow_engine::{run_parallel, PipelineResult};

/// Execute the `run` command: parse, validate, and run a pipeline.
pub async fn execute(pipeline_path: &Path, workers: u32, json: bool) -> Result<()> {
    // 1. Parse pipeline definition
    let definition = parser::parse_definition(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    // 2. Validate
    let registry = super::registry();
    validator::validate_definition(&definition, &registry)?;

    tracing::info!(
        pipeline = definition.name,
        extractor = definition.extractor.kind,
        steps = definition.steps.len(),
        workers,
        "Pipeline validated"
    );

    // 3. Run
    let results = if workers > 1 {
        run_parallel(&definition, Arc::new(registry), workers).await?
    } else {
        vec![definition.build(&registry)?.run().await?]
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("Pipeline '{}' completed successfully.", definition.name);
    for result in &results {
        print_result(result, results.len() > 1);
    }
    Ok(())
}

fn print_result(result: &PipelineResult, per_worker: bool) {
    if per_worker {
        println!("Worker {}:", result.worker_index);
    }
    println!("  Rows extracted:  {}", result.rows_extracted);
    println!("  Batches:         {}", result.batches);
    if result.batches_skipped > 0 {
        println!("  Batches skipped: {}", result.batches_skipped);
    }
    for (loader, rows) in result.rows_loaded() {
        println!("  Rows loaded:     {rows} ({loader})");
    }
    println!("  Duration:        {:.2}s", result.duration_secs);
    println!("    Extract:       {:.3}s", result.extract_duration_secs);
    println!("    Transform:     {:.3}s", result.transform_duration_secs());
    println!("    Finalize:      {:.3}s", result.finalize_duration_secs);
    for step in result.steps.iter().filter(|s| s.failures_skipped > 0) {
        println!("  Skipped loads:   {} ({})", step.failures_skipped, step.name);
    }
}
