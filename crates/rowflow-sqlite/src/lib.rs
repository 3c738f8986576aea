//! SQLite adapter for Rowflow.
//!
//! Provides a paged query extractor, a table loader and
//! [`QueryDataFrameFactory`], which turns a parameterized query into a
//! ready-made pipeline builder. Every stage encodes only its connection
//! parameters; the connection itself is opened lazily on first use, so a
//! decoded stage on a worker opens its own.

#![warn(clippy::pedantic)]

pub mod connection;
mod convert;
pub mod error;
pub mod extract;
pub mod factory;
pub mod load;

use rowflow_engine::StageRegistry;

pub use connection::{ConnectionParams, LazyConnection};
pub use error::SqliteError;
pub use extract::{QueryConfig, SqliteQueryExtractor};
pub use factory::{ParameterKind, QueryDataFrameFactory, QueryParameter, ROW_ENTRY};
pub use load::{SqliteTableLoader, TableConfig};

/// Add the SQLite stage kinds to `registry`.
pub fn register(registry: &mut StageRegistry) -> &mut StageRegistry {
    registry
        .register_extractor(SqliteQueryExtractor::KIND, SqliteQueryExtractor::decode)
        .register_loader(SqliteTableLoader::KIND, SqliteTableLoader::decode)
}
