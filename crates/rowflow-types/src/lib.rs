//! Typed record model shared by every Rowflow crate.
//!
//! [`Entry`] is one named, typed value; [`Row`] is an ordered, name-unique
//! set of entries; [`Rows`] is the batch that flows between stages; and
//! [`Schema`] describes the expected shape of a batch. The crate performs
//! no I/O and has no async surface, so it is safe to use from any stage.

#![warn(clippy::pedantic)]

pub mod entry;
pub mod error;
pub mod partition;
pub mod row;
pub mod rows;
pub mod schema;
pub mod value;

pub use entry::Entry;
pub use error::{RowError, SchemaError, TypeError};
pub use partition::{KeyValue, Partition, PartitionKey};
pub use row::Row;
pub use rows::{Rows, SortOrder};
pub use schema::{Definition, Schema, SchemaMode};
pub use value::{DataType, Value};
