//! Errors raised by the record model itself.

use crate::value::DataType;

/// An entry value does not satisfy its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("entry '{entry}' expects {expected}, got {actual}")]
    Mismatch {
        entry: String,
        expected: DataType,
        actual: &'static str,
    },

    #[error("entry '{entry}' is not nullable")]
    UnexpectedNull { entry: String },

    #[error("entry name must not be empty")]
    EmptyName,

    #[error("structure '{entry}' has duplicate field '{field}'")]
    DuplicateField { entry: String, field: String },
}

/// Violations of the row-level name uniqueness invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("duplicate entry '{0}' in row")]
    DuplicateEntry(String),

    #[error("entry '{0}' not found in row")]
    MissingEntry(String),
}

/// Schema construction, validation, and merge failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate definition '{0}' in schema")]
    DuplicateDefinition(String),

    #[error("row {row}: missing required entry '{name}'")]
    MissingEntry { row: usize, name: String },

    #[error("row {row}: entry '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        row: usize,
        name: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("row {row}: entry '{name}' is null but not nullable in schema")]
    UnexpectedNull { row: usize, name: String },

    #[error("row {row}: entry '{name}' is not declared in schema")]
    UnexpectedEntry { row: usize, name: String },

    #[error("definition '{name}' conflicts: {left} vs {right}")]
    Conflict {
        name: String,
        left: DataType,
        right: DataType,
    },
}
