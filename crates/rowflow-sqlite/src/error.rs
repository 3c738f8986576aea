//! SQLite adapter error types.

use rowflow_engine::{ExtractError, LoadError};
use rowflow_types::{RowError, SchemaError, TypeError};

/// Errors produced by the SQLite stages.
#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    /// The database could not be opened.
    #[error("cannot open sqlite database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("sqlite connection lock poisoned")]
    LockPoisoned,

    /// A query parameter names an entry the incoming rows lack.
    #[error("parameter '{parameter}' reads missing entry '{entry}'")]
    MissingEntry { parameter: String, entry: String },

    /// A blocking database task panicked or was cancelled.
    #[error("blocking sqlite task failed: {0}")]
    Blocking(String),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl SqliteError {
    fn is_unreachable(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Io(_))
    }
}

impl From<SqliteError> for ExtractError {
    fn from(err: SqliteError) -> Self {
        match err {
            e if e.is_unreachable() => ExtractError::unreachable(e.to_string()),
            e @ (SqliteError::Row(_) | SqliteError::Type(_)) => ExtractError::malformed(e.to_string()),
            e => ExtractError::internal(e.to_string()),
        }
    }
}

impl From<SqliteError> for LoadError {
    fn from(err: SqliteError) -> Self {
        match err {
            e if e.is_unreachable() => LoadError::unreachable(e.to_string()),
            SqliteError::Sqlite(e)
                if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) =>
            {
                LoadError::constraint(e.to_string())
            }
            e @ SqliteError::Schema(_) => LoadError::constraint(e.to_string()),
            e => LoadError::internal(e.to_string()),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SqliteError>;

/// Run synchronous `SQLite` work on tokio's blocking thread pool.
pub(crate) async fn run_blocking<T, F>(what: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SqliteError::Blocking(format!("{what} task panicked: {e}")))?
}
