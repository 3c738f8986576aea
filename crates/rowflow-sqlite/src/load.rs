//! Table loader.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use rowflow_engine::{LoadError, Loader, SerializationError, StageSpec};
use rowflow_types::{Rows, Schema};

use crate::connection::{ConnectionParams, LazyConnection};
use crate::convert::{column_type, quote_ident, to_sql};
use crate::error::{self, run_blocking};

fn default_create_table() -> bool {
    true
}

/// Portable configuration of a [`SqliteTableLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub connection: ConnectionParams,
    pub table: String,
    /// Create the table from the first batch's schema if it is missing.
    #[serde(default = "default_create_table")]
    pub create_table: bool,
}

/// Inserts every batch into one table, one transaction per batch.
///
/// Rows may be heterogeneous; each row inserts only the columns it has.
/// Inserts run on the blocking thread pool.
#[derive(Debug)]
pub struct SqliteTableLoader {
    config: Arc<TableConfig>,
    connection: Arc<LazyConnection>,
    table_ready: bool,
}

impl SqliteTableLoader {
    pub const KIND: &'static str = "sqlite_table";

    #[must_use]
    pub fn new(connection: ConnectionParams, table: impl Into<String>) -> Self {
        Self::from_config(TableConfig {
            connection,
            table: table.into(),
            create_table: true,
        })
    }

    #[must_use]
    pub fn from_config(config: TableConfig) -> Self {
        Self {
            connection: Arc::new(LazyConnection::new(config.connection.clone())),
            config: Arc::new(config),
            table_ready: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns [`SerializationError::InvalidConfig`] for a malformed config.
    pub fn decode(spec: &StageSpec) -> Result<Box<dyn Loader>, SerializationError> {
        Ok(Box::new(Self::from_config(spec.decode()?)))
    }
}

fn create_table_sql(table: &str, schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .iter()
        .map(|def| format!("{} {}", quote_ident(&def.name), column_type(&def.data_type)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        columns.join(", ")
    )
}

/// Insert `rows` in one transaction, creating the table first when
/// `create` is set. Returns the number inserted.
fn insert(
    connection: &LazyConnection,
    config: &TableConfig,
    create: bool,
    rows: &Rows,
) -> error::Result<usize> {
    let ddl = if create {
        Some(create_table_sql(&config.table, &rows.schema()?))
    } else {
        None
    };

    let conn = connection.lock_conn()?;
    if let Some(ddl) = ddl {
        conn.execute_batch(&ddl)?;
    }
    let table = quote_ident(&config.table);
    let tx = conn.unchecked_transaction()?;
    for row in rows.iter() {
        let columns: Vec<String> = row.iter().map(|e| quote_ident(e.name())).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let values: Vec<SqlValue> = row.iter().map(|e| to_sql(e.value())).collect();
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ))?;
        stmt.execute(rusqlite::params_from_iter(values))?;
    }
    tx.commit()?;
    Ok(rows.len())
}

#[async_trait]
impl Loader for SqliteTableLoader {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn load(&mut self, rows: Rows) -> Result<(), LoadError> {
        let connection = Arc::clone(&self.connection);
        let config = Arc::clone(&self.config);
        let create = self.config.create_table && !self.table_ready;
        let inserted =
            run_blocking("insert", move || insert(&connection, &config, create, &rows)).await?;
        self.table_ready = true;
        tracing::debug!(table = self.config.table, rows = inserted, "Inserted batch");
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), LoadError> {
        // Every insert task has been awaited, so this handle is normally the
        // only one; otherwise the connection closes with its last holder.
        if Arc::get_mut(&mut self.connection)
            .map(LazyConnection::release)
            .is_none()
        {
            self.connection = Arc::new(LazyConnection::new(self.config.connection.clone()));
        }
        self.table_ready = false;
        Ok(())
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        StageSpec::encode(Self::KIND, self.config.as_ref())
    }
}
