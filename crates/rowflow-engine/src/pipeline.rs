//! Pipeline assembly.
//!
//! A [`PipelineBuilder`] collects one extractor and an ordered list of
//! steps. Steps are transformers or load steps and run in registration
//! order for every batch; a load step registered before later transformers
//! is a write-through that sees the batch as it is at that point. Nothing
//! executes until [`Pipeline::run`].

use rowflow_types::SortOrder;

use crate::definition::{LoadStepDefinition, PipelineDefinition, StepDefinition};
use crate::errors::{ErrorPolicy, PipelineError, SerializationError};
use crate::expr::Expression;
use crate::extract::{Extractor, DEFAULT_BATCH_SIZE};
use crate::load::Loader;
use crate::partition::Partitioner;
use crate::result::PipelineResult;
use crate::runner;
use crate::transform::{
    DropEntries, Filter, Limit, Rename, Select, SortBy, Transformer, WithEntry,
};

pub const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// A load step: loader plus how to partition and what to do on failure.
pub struct LoadStep {
    pub(crate) loader: Box<dyn Loader>,
    pub(crate) partitioner: Option<Box<dyn Partitioner>>,
    pub(crate) policy: ErrorPolicy,
    /// Errors are logged at warn and never fail the run.
    pub(crate) diagnostic: bool,
}

impl LoadStep {
    #[must_use]
    pub fn new(loader: Box<dyn Loader>) -> Self {
        Self {
            loader,
            partitioner: None,
            policy: ErrorPolicy::Fail,
            diagnostic: false,
        }
    }

    #[must_use]
    pub fn partitioned(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn diagnostic(mut self) -> Self {
        self.diagnostic = true;
        self
    }
}

pub(crate) enum Step {
    Transform(Box<dyn Transformer>),
    Load(LoadStep),
}

impl Step {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Transform(t) => t.name(),
            Self::Load(l) => l.loader.name(),
        }
    }
}

/// Fluent builder for a [`Pipeline`].
pub struct PipelineBuilder {
    name: String,
    batch_size: usize,
    extractor: Option<Box<dyn Extractor>>,
    on_extract_error: ErrorPolicy,
    steps: Vec<Step>,
    worker_index: u32,
    worker_count: u32,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            name: DEFAULT_PIPELINE_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            extractor: None,
            on_extract_error: ErrorPolicy::Fail,
            steps: Vec::new(),
            worker_index: 0,
            worker_count: 1,
        }
    }
}

#[allow(clippy::should_implement_trait)]
impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run as shard `index` of `count` workers. Checked by [`Self::build`].
    #[must_use]
    pub fn worker(mut self, index: u32, count: u32) -> Self {
        self.worker_index = index;
        self.worker_count = count;
        self
    }

    /// Set the extractor, replacing any earlier one.
    #[must_use]
    pub fn read(self, extractor: impl Extractor + 'static) -> Self {
        self.read_boxed(Box::new(extractor))
    }

    #[must_use]
    pub fn read_boxed(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn on_extract_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_extract_error = policy;
        self
    }

    #[must_use]
    pub fn transform(self, transformer: impl Transformer + 'static) -> Self {
        self.transform_boxed(Box::new(transformer))
    }

    #[must_use]
    pub fn transform_boxed(mut self, transformer: Box<dyn Transformer>) -> Self {
        self.steps.push(Step::Transform(transformer));
        self
    }

    /// Derive or replace entry `name` from `expression`.
    #[must_use]
    pub fn with_entry(self, name: impl Into<String>, expression: impl Into<Expression>) -> Self {
        self.transform(WithEntry::new(name, expression))
    }

    #[must_use]
    pub fn filter(self, condition: impl Into<Expression>) -> Self {
        self.transform(Filter::new(condition))
    }

    #[must_use]
    pub fn drop<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transform(DropEntries::new(names))
    }

    #[must_use]
    pub fn select<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transform(Select::new(names))
    }

    #[must_use]
    pub fn rename(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transform(Rename::new(from, to))
    }

    #[must_use]
    pub fn sort_by(self, entry: impl Into<String>, order: SortOrder) -> Self {
        self.transform(SortBy::new(entry, order))
    }

    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        self.transform(Limit::new(limit))
    }

    /// Load the batch as it is at this point.
    #[must_use]
    pub fn write(self, loader: impl Loader + 'static) -> Self {
        self.load_step(LoadStep::new(Box::new(loader)))
    }

    #[must_use]
    pub fn write_partitioned(
        self,
        loader: impl Loader + 'static,
        partitioner: impl Partitioner + 'static,
    ) -> Self {
        self.load_step(LoadStep::new(Box::new(loader)).partitioned(Box::new(partitioner)))
    }

    #[must_use]
    pub fn write_with_policy(self, loader: impl Loader + 'static, policy: ErrorPolicy) -> Self {
        self.load_step(LoadStep::new(Box::new(loader)).policy(policy))
    }

    /// Register a diagnostic load step at this position. It sees the batch
    /// before every step registered after it; its failures are logged and
    /// never fail the run. It does not count as the pipeline's loader.
    #[must_use]
    pub fn echo(self, loader: impl Loader + 'static) -> Self {
        self.load_step(LoadStep::new(Box::new(loader)).diagnostic())
    }

    #[must_use]
    pub fn load_step(mut self, step: LoadStep) -> Self {
        self.steps.push(Step::Load(step));
        self
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Build`] if no extractor or no
    /// non-diagnostic loader is registered, the batch size is zero, or the
    /// worker index is outside `0..count`.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let Some(extractor) = self.extractor else {
            return Err(PipelineError::Build(format!(
                "pipeline '{}' has no extractor",
                self.name
            )));
        };
        let has_loader = self
            .steps
            .iter()
            .any(|s| matches!(s, Step::Load(l) if !l.diagnostic));
        if !has_loader {
            return Err(PipelineError::Build(format!(
                "pipeline '{}' has no loader",
                self.name
            )));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Build("batch_size must be at least 1".into()));
        }
        check_worker(self.worker_index, self.worker_count)?;
        Ok(Pipeline {
            name: self.name,
            batch_size: self.batch_size,
            extractor,
            on_extract_error: self.on_extract_error,
            steps: self.steps,
            worker_index: self.worker_index,
            worker_count: self.worker_count,
        })
    }
}

fn check_worker(index: u32, count: u32) -> Result<(), PipelineError> {
    if count == 0 {
        return Err(PipelineError::Build("worker count must be at least 1".into()));
    }
    if index >= count {
        return Err(PipelineError::Build(format!(
            "worker index {index} is out of range for {count} worker(s)"
        )));
    }
    Ok(())
}

/// A runnable pipeline. Consumed by [`Pipeline::run`].
pub struct Pipeline {
    pub(crate) name: String,
    pub(crate) batch_size: usize,
    pub(crate) extractor: Box<dyn Extractor>,
    pub(crate) on_extract_error: ErrorPolicy,
    pub(crate) steps: Vec<Step>,
    pub(crate) worker_index: u32,
    pub(crate) worker_count: u32,
}

impl Pipeline {
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run as shard `index` of `count` workers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Build`] if `count` is zero or `index` is not
    /// below it.
    pub fn with_worker(mut self, index: u32, count: u32) -> Result<Self, PipelineError> {
        check_worker(index, count)?;
        self.worker_index = index;
        self.worker_count = count;
        Ok(self)
    }

    /// Names of the registered steps, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Execute until the extractor is exhausted or a stage fails. Every
    /// loader's `finalize` is attempted on both paths.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`PipelineError`], with finalize failures
    /// attached.
    pub async fn run(self) -> Result<PipelineResult, PipelineError> {
        runner::execute(self).await
    }

    /// Encode every stage into a portable definition.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::NotSerializable`] if any stage is
    /// closure-backed or in-memory.
    pub fn to_definition(&self) -> Result<PipelineDefinition, SerializationError> {
        let steps = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Transform(t) => Ok(StepDefinition::Transform(t.to_spec()?)),
                Step::Load(l) => Ok(StepDefinition::Load(LoadStepDefinition {
                    loader: l.loader.to_spec()?,
                    partitioner: l.partitioner.as_ref().map(|p| p.to_spec()).transpose()?,
                    policy: l.policy,
                    diagnostic: l.diagnostic,
                })),
            })
            .collect::<Result<Vec<_>, SerializationError>>()?;
        Ok(PipelineDefinition {
            name: self.name.clone(),
            batch_size: self.batch_size,
            extractor: self.extractor.to_spec()?,
            on_extract_error: self.on_extract_error,
            steps,
        })
    }
}
