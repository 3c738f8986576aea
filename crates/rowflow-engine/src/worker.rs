//! Explicit parallel execution across tokio tasks.
//!
//! The definition is encoded once; every worker decodes its own copy,
//! rebuilds its own stages (and therefore its own live resources) and runs
//! one shard of the extractor. Results are not merged.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::definition::PipelineDefinition;
use crate::errors::PipelineError;
use crate::result::PipelineResult;
use crate::stage::StageRegistry;

/// Run `workers` copies of `definition`, worker `i` extracting shard `i`.
///
/// Waits for every worker so each one finalizes its loaders, then returns
/// the per-worker results ordered by worker index.
///
/// # Errors
///
/// Returns the first worker failure in completion order. A panic inside a
/// stage surfaces as that worker's [`PipelineError::Panicked`];
/// [`PipelineError::Worker`] is left for panics outside the run itself.
pub async fn run_parallel(
    definition: &PipelineDefinition,
    registry: Arc<StageRegistry>,
    workers: u32,
) -> Result<Vec<PipelineResult>, PipelineError> {
    if workers == 0 {
        return Err(PipelineError::Build("workers must be at least 1".into()));
    }
    let bytes: Arc<[u8]> = definition.to_bytes()?.into();

    tracing::info!(
        pipeline = definition.name,
        workers,
        definition_bytes = bytes.len(),
        "Starting parallel run"
    );

    let mut join_set = JoinSet::new();
    for worker_index in 0..workers {
        let bytes = Arc::clone(&bytes);
        let registry = Arc::clone(&registry);
        join_set.spawn(async move {
            let definition = PipelineDefinition::from_bytes(&bytes)?;
            definition
                .build(&registry)?
                .with_worker(worker_index, workers)?
                .run()
                .await
        });
    }

    let mut results = Vec::with_capacity(workers as usize);
    let mut first_error: Option<PipelineError> = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(error)) => {
                tracing::error!(pipeline = definition.name, "Worker failed: {}", error);
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            Err(join_err) => {
                tracing::error!(pipeline = definition.name, "Worker task panicked: {}", join_err);
                if first_error.is_none() {
                    first_error = Some(PipelineError::Worker(join_err.to_string()));
                }
            }
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }
    results.sort_by_key(|r| r.worker_index);
    Ok(results)
}
