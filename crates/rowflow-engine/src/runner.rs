//! Sequential execution of one pipeline.
//!
//! Batches are pulled one at a time. Each batch runs through every step in
//! registration order before the next batch is pulled. On any exit path,
//! a panicking stage included, the runner stops pulling and attempts
//! `finalize` on every loader.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::{FutureExt, StreamExt};

use rowflow_types::{Partition, PartitionKey, Rows};

use crate::errors::{ErrorPolicy, FinalizeError, LoadError, PipelineError};
use crate::extract::{ExtractContext, Extractor};
use crate::pipeline::{LoadStep, Pipeline, Step};
use crate::result::{PipelineResult, StepKind, StepMetric};

/// Lifecycle of a run, logged at debug level on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

struct StateTracker<'a> {
    pipeline: &'a str,
    worker: u32,
    state: RunState,
}

impl StateTracker<'_> {
    fn enter(&mut self, next: RunState, batch_index: u64) {
        if self.state != next {
            tracing::debug!(
                pipeline = self.pipeline,
                worker = self.worker,
                batch_index,
                from = ?self.state,
                to = ?next,
                "Run state transition"
            );
            self.state = next;
        }
    }
}

pub(crate) async fn execute(pipeline: Pipeline) -> Result<PipelineResult, PipelineError> {
    let start = Instant::now();
    let Pipeline {
        name,
        batch_size,
        mut extractor,
        on_extract_error,
        mut steps,
        worker_index,
        worker_count,
    } = pipeline;

    let metrics = steps
        .iter()
        .map(|step| {
            let kind = match step {
                Step::Transform(_) => StepKind::Transform,
                Step::Load(l) if l.diagnostic => StepKind::Diagnostic,
                Step::Load(_) => StepKind::Load,
            };
            StepMetric::new(step.name(), kind)
        })
        .collect();
    let mut result = PipelineResult::new(name.as_str(), worker_index, metrics);
    let mut tracker = StateTracker {
        pipeline: &name,
        worker: worker_index,
        state: RunState::Idle,
    };

    tracing::info!(
        pipeline = name,
        worker = worker_index,
        workers = worker_count,
        steps = steps.len(),
        "Starting pipeline run"
    );

    let ctx = ExtractContext {
        worker_index,
        worker_count,
        batch_size,
    };
    let outcome = AssertUnwindSafe(drive(
        extractor.as_mut(),
        &ctx,
        on_extract_error,
        &mut steps,
        &mut result,
        &mut tracker,
    ))
    .catch_unwind()
    .await
    .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload.as_ref()))));

    let finalize_start = Instant::now();
    let finalize_errors = finalize_all(&mut steps, &name).await;
    result.finalize_duration_secs = finalize_start.elapsed().as_secs_f64();
    result.duration_secs = start.elapsed().as_secs_f64();

    match PipelineError::with_finalize(outcome.err(), finalize_errors) {
        Some(err) => {
            tracker.enter(RunState::Failed, result.batches);
            tracing::error!(pipeline = name, worker = worker_index, "Pipeline failed: {}", err);
            Err(err)
        }
        None => {
            tracker.enter(RunState::Done, result.batches);
            tracing::info!(
                pipeline = name,
                worker = worker_index,
                rows_extracted = result.rows_extracted,
                rows_loaded = result.total_rows_loaded(),
                batches = result.batches,
                batches_skipped = result.batches_skipped,
                duration_secs = result.duration_secs,
                "Pipeline run complete"
            );
            Ok(result)
        }
    }
}

async fn drive(
    extractor: &mut dyn Extractor,
    ctx: &ExtractContext,
    on_extract_error: ErrorPolicy,
    steps: &mut [Step],
    result: &mut PipelineResult,
    tracker: &mut StateTracker<'_>,
) -> Result<(), PipelineError> {
    let extractor_name = extractor.name().to_string();
    let mut stream = extractor.extract(ctx);
    let mut batch_index: u64 = 0;

    loop {
        tracker.enter(RunState::Extracting, batch_index);
        let pulled = Instant::now();
        let Some(item) = stream.next().await else {
            break;
        };
        result.extract_duration_secs += pulled.elapsed().as_secs_f64();
        let index = batch_index;
        batch_index += 1;

        let rows = match item {
            Ok(rows) => rows,
            Err(err) if on_extract_error == ErrorPolicy::Skip => {
                tracing::warn!(
                    pipeline = tracker.pipeline,
                    stage = extractor_name,
                    batch_index = index,
                    "Skipping batch after extract error: {}",
                    err
                );
                result.batches_skipped += 1;
                continue;
            }
            Err(err) => return Err(PipelineError::stage(extractor_name, index, err)),
        };

        result.batches += 1;
        result.rows_extracted += rows.len() as u64;
        tracing::debug!(
            pipeline = tracker.pipeline,
            batch_index = index,
            rows = rows.len(),
            "Batch extracted"
        );
        run_steps(steps, rows, index, result, tracker).await?;
    }
    Ok(())
}

async fn run_steps(
    steps: &mut [Step],
    mut rows: Rows,
    index: u64,
    result: &mut PipelineResult,
    tracker: &mut StateTracker<'_>,
) -> Result<(), PipelineError> {
    for (step, metric) in steps.iter_mut().zip(result.steps.iter_mut()) {
        let started = Instant::now();
        metric.batches += 1;
        metric.rows_in += rows.len() as u64;
        match step {
            Step::Transform(transformer) => {
                tracker.enter(RunState::Transforming, index);
                rows = transformer
                    .transform(rows)
                    .map_err(|e| PipelineError::stage(transformer.name(), index, e))?;
            }
            Step::Load(load) => {
                tracker.enter(RunState::Loading, index);
                load_batch(load, &rows, index, metric, tracker.pipeline).await?;
            }
        }
        metric.duration_secs += started.elapsed().as_secs_f64();
    }
    Ok(())
}

async fn load_batch(
    load: &mut LoadStep,
    rows: &Rows,
    index: u64,
    metric: &mut StepMetric,
    pipeline: &str,
) -> Result<(), PipelineError> {
    let partitions = match &load.partitioner {
        Some(partitioner) => partitioner.partition(rows),
        None if rows.is_empty() => Vec::new(),
        None => vec![Partition {
            key: PartitionKey::unpartitioned(),
            rows: rows.clone(),
        }],
    };

    for partition in partitions {
        let count = partition.rows.len() as u64;
        match load.loader.load_partition(&partition.key, partition.rows).await {
            Ok(()) => metric.rows_loaded += count,
            Err(err) if load.diagnostic => {
                tracing::warn!(
                    pipeline,
                    stage = load.loader.name(),
                    batch_index = index,
                    "Diagnostic loader failed: {}",
                    err
                );
                metric.failures_skipped += 1;
            }
            Err(err) if load.policy == ErrorPolicy::Skip => {
                tracing::warn!(
                    pipeline,
                    stage = load.loader.name(),
                    batch_index = index,
                    partition = %partition.key,
                    "Skipping batch after load error: {}",
                    err
                );
                metric.failures_skipped += 1;
            }
            Err(err) => {
                return Err(PipelineError::stage(load.loader.name(), index, err));
            }
        }
    }
    Ok(())
}

/// Finalize every loader, each attempted even if an earlier one fails.
/// Diagnostic failures are logged only.
async fn finalize_all(steps: &mut [Step], pipeline: &str) -> Vec<FinalizeError> {
    let mut errors = Vec::new();
    for step in steps.iter_mut() {
        let Step::Load(load) = step else {
            continue;
        };
        let finalized = AssertUnwindSafe(load.loader.finalize())
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(LoadError::internal(format!(
                    "finalize panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        if let Err(error) = finalized {
            let loader = load.loader.name().to_string();
            if load.diagnostic {
                tracing::warn!(pipeline, stage = loader, "Diagnostic finalize failed: {}", error);
            } else {
                tracing::error!(pipeline, stage = loader, "Finalize failed: {}", error);
                errors.push(FinalizeError { loader, error });
            }
        }
    }
    errors
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
