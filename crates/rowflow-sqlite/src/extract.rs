//! Paged query extraction.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rusqlite::types::Value as SqlValue;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use rowflow_engine::{
    ExtractContext, ExtractError, Extractor, RowsStream, SerializationError, StageSpec,
};
use rowflow_types::{Entry, Row, Rows, Value};

use crate::connection::{ConnectionParams, LazyConnection};
use crate::convert::{entry_from_sql, to_sql};
use crate::error::{self, run_blocking};

/// Portable configuration of a [`SqliteQueryExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub connection: ConnectionParams,
    pub query: String,
    /// Named parameters; keys may omit the leading `:`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    /// Rows per page. Defaults to the pipeline batch size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    /// Wrap each record in one structure entry with this name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_entry: Option<String>,
}

/// Runs a query page by page with `LIMIT`/`OFFSET`, one batch per page.
///
/// Under `worker_count > 1` worker `i` reads pages `i`, `i + n`, `i + 2n`
/// and so on, so shards are disjoint as long as the query orders its rows
/// deterministically.
#[derive(Debug)]
pub struct SqliteQueryExtractor {
    config: QueryConfig,
    connection: Arc<LazyConnection>,
}

impl SqliteQueryExtractor {
    pub const KIND: &'static str = "sqlite_query";

    #[must_use]
    pub fn new(connection: ConnectionParams, query: impl Into<String>) -> Self {
        Self::from_config(QueryConfig {
            connection,
            query: query.into(),
            parameters: BTreeMap::new(),
            page_size: None,
            row_entry: None,
        })
    }

    #[must_use]
    pub fn from_config(config: QueryConfig) -> Self {
        let connection = Arc::new(LazyConnection::new(config.connection.clone()));
        Self { config, connection }
    }

    /// Share an existing (possibly already open) connection.
    #[must_use]
    pub fn with_connection(mut self, connection: Arc<LazyConnection>) -> Self {
        self.config.connection = connection.params().clone();
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn with_row_entry(mut self, name: impl Into<String>) -> Self {
        self.config.row_entry = Some(name.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns [`SerializationError::InvalidConfig`] for a malformed config.
    pub fn decode(spec: &StageSpec) -> Result<Box<dyn Extractor>, SerializationError> {
        Ok(Box::new(Self::from_config(spec.decode()?)))
    }
}

/// Read one page of `config.query`.
fn fetch_page(
    connection: &LazyConnection,
    config: &QueryConfig,
    offset: usize,
    limit: usize,
) -> error::Result<Rows> {
    let sql = format!(
        "SELECT * FROM ({}) LIMIT {limit} OFFSET {offset}",
        config.query.trim().trim_end_matches(';')
    );
    let bound: Vec<(String, SqlValue)> = config
        .parameters
        .iter()
        .map(|(name, value)| (parameter_name(name), to_sql(value)))
        .collect();
    let named: Vec<(&str, &dyn ToSql)> = bound
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();

    let conn = connection.lock_conn()?;
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut cursor = stmt.query(named.as_slice())?;

    let mut rows = Vec::new();
    while let Some(record) = cursor.next()? {
        let entries = columns
            .iter()
            .enumerate()
            .map(|(i, name)| Ok(entry_from_sql(name, record.get_ref(i)?)))
            .collect::<rusqlite::Result<Vec<Entry>>>()?;
        let row = match &config.row_entry {
            Some(name) => Row::new(vec![Entry::structure(name.as_str(), entries)?])?,
            None => Row::new(entries)?,
        };
        rows.push(row);
    }
    Ok(Rows::new(rows))
}

fn parameter_name(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

impl Extractor for SqliteQueryExtractor {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn extract<'a>(&'a mut self, ctx: &ExtractContext) -> RowsStream<'a> {
        let page_size = self.config.page_size.unwrap_or(ctx.batch_size).max(1);
        let first_page = ctx.worker_index as usize;
        let stride = ctx.worker_count.max(1) as usize;
        let connection = Arc::clone(&self.connection);
        let config = Arc::new(self.config.clone());

        stream::unfold(Some(first_page), move |page| {
            let connection = Arc::clone(&connection);
            let config = Arc::clone(&config);
            async move {
                let page = page?;
                let fetched = run_blocking("fetch page", move || {
                    fetch_page(&connection, &config, page * page_size, page_size)
                })
                .await;
                match fetched {
                    Ok(rows) if rows.is_empty() => None,
                    Ok(rows) => {
                        let next = (rows.len() == page_size).then_some(page + stride);
                        tracing::debug!(page, rows = rows.len(), "Fetched sqlite page");
                        Some((Ok(rows), next))
                    }
                    Err(err) => Some((Err(ExtractError::from(err)), None)),
                }
            }
        })
        .boxed()
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        StageSpec::encode(Self::KIND, &self.config)
    }
}
