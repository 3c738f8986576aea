//! Expression evaluation, stage contracts and pipeline execution for Rowflow.
//!
//! A [`Pipeline`] pulls [`rowflow_types::Rows`] from one [`Extractor`],
//! runs them through ordered transformer and load steps, and finalizes its
//! loaders on every exit path. Every built-in stage encodes to a
//! [`StageSpec`], so a whole pipeline can travel as a
//! [`PipelineDefinition`] and be rebuilt by [`run_parallel`] workers.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod definition;
pub mod dsl;
pub mod errors;
pub mod expr;
pub mod extract;
pub mod load;
pub mod partition;
pub mod pipeline;
pub mod result;
pub mod runner;
pub mod stage;
pub mod transform;
pub mod worker;

// Re-export public API for convenience
pub use definition::{LoadStepDefinition, PipelineDefinition, StepDefinition};
pub use errors::{
    ErrorPolicy, ExtractError, LoadError, PipelineError, SerializationError, StageFailure,
    StageRole, TransformError, TransformErrorKind,
};
pub use expr::{BinaryOp, EvalError, Expression};
pub use extract::{ExtractContext, Extractor, RowsExtractor, RowsStream};
pub use load::{Loader, MemoryHandle, MemoryLoader, OutputConfig, OutputFormat, OutputLoader};
pub use partition::{ByEntries, HashBuckets, Partitioner, SinglePartition};
pub use pipeline::{LoadStep, Pipeline, PipelineBuilder};
pub use result::{PipelineResult, StepKind, StepMetric};
pub use runner::RunState;
pub use stage::{encode_config, ConfigStage, StageConfig, StageRegistry, StageSpec};
pub use transform::{
    CallbackTransformer, DropEntries, Filter, Limit, Rename, Select, SortBy, StructureUnpack,
    Transformer, WithEntry,
};
pub use worker::run_parallel;
