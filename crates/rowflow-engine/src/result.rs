//! Pipeline execution results and per-step timing.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Transform,
    Load,
    /// Load step whose failures are only logged.
    Diagnostic,
}

/// Counters for one registered step.
#[derive(Debug, Clone, Serialize)]
pub struct StepMetric {
    pub name: String,
    pub kind: StepKind,
    pub batches: u64,
    pub rows_in: u64,
    /// Rows accepted by the loader. Always zero for transforms.
    pub rows_loaded: u64,
    /// Load calls that failed and were skipped by policy or because the
    /// step is diagnostic.
    pub failures_skipped: u64,
    pub duration_secs: f64,
}

impl StepMetric {
    pub(crate) fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            batches: 0,
            rows_in: 0,
            rows_loaded: 0,
            failures_skipped: 0,
            duration_secs: 0.0,
        }
    }
}

/// Result of one pipeline run (one worker under `run_parallel`).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub pipeline: String,
    pub worker_index: u32,
    pub rows_extracted: u64,
    pub batches: u64,
    /// Extract batches dropped under `ErrorPolicy::Skip`.
    pub batches_skipped: u64,
    pub steps: Vec<StepMetric>,
    pub extract_duration_secs: f64,
    pub finalize_duration_secs: f64,
    pub duration_secs: f64,
}

impl PipelineResult {
    pub(crate) fn new(pipeline: impl Into<String>, worker_index: u32, steps: Vec<StepMetric>) -> Self {
        Self {
            pipeline: pipeline.into(),
            worker_index,
            rows_extracted: 0,
            batches: 0,
            batches_skipped: 0,
            steps,
            extract_duration_secs: 0.0,
            finalize_duration_secs: 0.0,
            duration_secs: 0.0,
        }
    }

    /// Rows loaded per non-diagnostic load step, in registration order.
    #[must_use]
    pub fn rows_loaded(&self) -> Vec<(&str, u64)> {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Load)
            .map(|s| (s.name.as_str(), s.rows_loaded))
            .collect()
    }

    /// Rows loaded by all non-diagnostic load steps.
    #[must_use]
    pub fn total_rows_loaded(&self) -> u64 {
        self.rows_loaded().iter().map(|(_, rows)| rows).sum()
    }

    #[must_use]
    pub fn transform_duration_secs(&self) -> f64 {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Transform)
            .map(|s| s.duration_secs)
            .sum()
    }
}
