//! Stage and pipeline error model.
//!
//! Each stage kind has its own error type so that a failure carries the
//! information its producer knows about. [`PipelineError`] wraps them with
//! the failing stage name and batch index.

use serde::{Deserialize, Serialize};

use rowflow_types::{RowError, TypeError};

use crate::expr::EvalError;

// ---------------------------------------------------------------------------
// Extract / load errors
// ---------------------------------------------------------------------------

/// Failure raised by an extractor while producing a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ExtractError {
    pub code: String,
    pub message: String,
}

impl ExtractError {
    pub const UNREACHABLE: &'static str = "SOURCE_UNREACHABLE";
    pub const MALFORMED: &'static str = "MALFORMED_RECORD";
    pub const INTERNAL: &'static str = "INTERNAL";

    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Source could not be reached or opened.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(Self::UNREACHABLE, message)
    }

    /// A source record could not be turned into a row.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(Self::MALFORMED, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }
}

/// Failure raised by a loader while writing or finalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct LoadError {
    pub code: String,
    pub message: String,
}

impl LoadError {
    pub const UNREACHABLE: &'static str = "SINK_UNREACHABLE";
    pub const CONSTRAINT: &'static str = "CONSTRAINT_VIOLATION";
    pub const INTERNAL: &'static str = "INTERNAL";

    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(Self::UNREACHABLE, message)
    }

    /// The sink rejected the batch (schema, uniqueness, type).
    #[must_use]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(Self::CONSTRAINT, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }
}

// ---------------------------------------------------------------------------
// Transform errors
// ---------------------------------------------------------------------------

/// What went wrong inside a transformer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformErrorKind {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Failure raised by a transformer, tagged with the transformer's name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transformer '{transformer}': {kind}")]
pub struct TransformError {
    pub transformer: String,
    pub kind: TransformErrorKind,
}

impl TransformError {
    #[must_use]
    pub fn new(transformer: impl Into<String>, kind: impl Into<TransformErrorKind>) -> Self {
        Self {
            transformer: transformer.into(),
            kind: kind.into(),
        }
    }

    #[must_use]
    pub fn precondition(transformer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(transformer, TransformErrorKind::Precondition(message.into()))
    }
}

// ---------------------------------------------------------------------------
// Serialization errors
// ---------------------------------------------------------------------------

/// Which stage contract a spec was decoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    Extractor,
    Transformer,
    Loader,
    Partitioner,
}

impl std::fmt::Display for StageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Extractor => "extractor",
            Self::Transformer => "transformer",
            Self::Loader => "loader",
            Self::Partitioner => "partitioner",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("unknown {role} kind '{kind}'")]
    UnknownKind { role: StageRole, kind: String },

    #[error("invalid config for '{kind}': {message}")]
    InvalidConfig { kind: String, message: String },

    #[error("stage '{0}' holds live state and cannot be serialized")]
    NotSerializable(String),

    #[error("config of '{0}' must encode to a JSON object")]
    NotAnObject(String),

    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Error policy
// ---------------------------------------------------------------------------

/// What to do when an extract or load call fails for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Log at warn and continue with the next batch.
    Skip,
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// The stage-level cause of a [`PipelineError::Stage`].
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A loader whose `finalize` hook failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeError {
    pub loader: String,
    pub error: LoadError,
}

impl std::fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.loader, self.error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage failed while processing batch `batch_index`.
    #[error("stage '{stage}' failed at batch {batch_index}: {failure}")]
    Stage {
        stage: String,
        batch_index: u64,
        failure: StageFailure,
    },

    #[error("invalid pipeline: {0}")]
    Build(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A parallel worker could not be joined (panic or cancellation).
    #[error("worker failed: {0}")]
    Worker(String),

    /// A stage panicked. Loaders were still finalized.
    #[error("pipeline panicked: {0}")]
    Panicked(String),

    /// Finalize hooks failed, with or without an earlier fatal error.
    /// The primary error, if any, is never replaced.
    #[error("{}", describe_with_finalize(.primary.as_deref(), .finalize_errors))]
    WithFinalize {
        primary: Option<Box<PipelineError>>,
        finalize_errors: Vec<FinalizeError>,
    },
}

fn describe_with_finalize(primary: Option<&PipelineError>, errors: &[FinalizeError]) -> String {
    let finalize = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    match primary {
        Some(primary) => format!("{primary} (finalize also failed: {finalize})"),
        None => format!("finalize failed: {finalize}"),
    }
}

impl PipelineError {
    pub(crate) fn stage(
        stage: impl Into<String>,
        batch_index: u64,
        failure: impl Into<StageFailure>,
    ) -> Self {
        Self::Stage {
            stage: stage.into(),
            batch_index,
            failure: failure.into(),
        }
    }

    /// Attach finalize failures. Returns `primary` unchanged when there
    /// are none.
    pub(crate) fn with_finalize(primary: Option<Self>, errors: Vec<FinalizeError>) -> Option<Self> {
        if errors.is_empty() {
            return primary;
        }
        Some(Self::WithFinalize {
            primary: primary.map(Box::new),
            finalize_errors: errors,
        })
    }

    /// The error that stopped the run, looking through finalize wrappers.
    #[must_use]
    pub fn primary(&self) -> Option<&PipelineError> {
        match self {
            Self::WithFinalize { primary, .. } => primary.as_deref(),
            other => Some(other),
        }
    }

    /// Stage-level cause, if the run stopped in a stage.
    #[must_use]
    pub fn stage_failure(&self) -> Option<&StageFailure> {
        match self.primary()? {
            Self::Stage { failure, .. } => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn finalize_errors(&self) -> &[FinalizeError] {
        match self {
            Self::WithFinalize {
                finalize_errors, ..
            } => finalize_errors,
            _ => &[],
        }
    }
}
