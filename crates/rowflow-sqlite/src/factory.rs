//! Query-backed data frames.
//!
//! A [`QueryDataFrameFactory`] holds a parameterized query and knows how to
//! bind its parameters from a batch of rows. Each call to
//! [`QueryDataFrameFactory::from_rows`] yields a fresh pipeline builder that
//! reads the query into one structure entry per record, unpacks it to the
//! top level and drops it.

use std::sync::{Arc, OnceLock};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use rowflow_engine::{Pipeline, PipelineBuilder, StructureUnpack};
use rowflow_types::{Rows, Value};

use crate::connection::{ConnectionParams, LazyConnection};
use crate::error::{self, SqliteError};
use crate::extract::SqliteQueryExtractor;

/// Structure entry the query records are read into before unpacking.
pub const ROW_ENTRY: &str = "row";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// The entry's value in the first row; null for an empty batch.
    #[default]
    Scalar,
    /// The entry's values across all rows, bound as a JSON array for use
    /// with `json_each`.
    List,
}

/// Binds query parameter `name` from entry `entry` of the incoming rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub entry: String,
    #[serde(default)]
    pub kind: ParameterKind,
}

impl QueryParameter {
    #[must_use]
    pub fn scalar(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            kind: ParameterKind::Scalar,
        }
    }

    #[must_use]
    pub fn list(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            kind: ParameterKind::List,
            ..Self::scalar(name, entry)
        }
    }

    /// # Errors
    ///
    /// Returns [`SqliteError::MissingEntry`] if a row lacks the entry.
    pub fn to_value(&self, rows: &Rows) -> error::Result<Value> {
        let read = |row: &rowflow_types::Row| {
            row.get(&self.entry)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| SqliteError::MissingEntry {
                    parameter: self.name.clone(),
                    entry: self.entry.clone(),
                })
        };
        match self.kind {
            ParameterKind::Scalar => rows.first().map_or(Ok(Value::Null), read),
            ParameterKind::List => rows
                .iter()
                .map(read)
                .collect::<error::Result<Vec<_>>>()
                .map(Value::List),
        }
    }
}

/// Serializable as `{connection_params, query, parameters}`; the
/// connection is opened on first use and shared by every pipeline the
/// factory builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDataFrameFactory {
    connection_params: ConnectionParams,
    query: String,
    #[serde(default)]
    parameters: Vec<QueryParameter>,
    #[serde(skip)]
    connection: OnceLock<Arc<LazyConnection>>,
}

impl QueryDataFrameFactory {
    #[must_use]
    pub fn new(
        connection_params: ConnectionParams,
        query: impl Into<String>,
        parameters: Vec<QueryParameter>,
    ) -> Self {
        Self {
            connection_params,
            query: query.into(),
            parameters,
            connection: OnceLock::new(),
        }
    }

    /// Use an already open connection. Only `params` is encoded.
    #[must_use]
    pub fn from_connection(
        params: ConnectionParams,
        connection: Connection,
        query: impl Into<String>,
        parameters: Vec<QueryParameter>,
    ) -> Self {
        let factory = Self::new(params.clone(), query, parameters);
        let _ = factory
            .connection
            .set(Arc::new(LazyConnection::from_connection(params, connection)));
        factory
    }

    #[must_use]
    pub fn connection_params(&self) -> &ConnectionParams {
        &self.connection_params
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    fn connection(&self) -> Arc<LazyConnection> {
        Arc::clone(
            self.connection
                .get_or_init(|| Arc::new(LazyConnection::new(self.connection_params.clone()))),
        )
    }

    /// Bind the parameters from `rows` and return a builder that extracts
    /// the query result. Add steps and a loader, then build and run it.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MissingEntry`] if a parameter cannot be bound.
    pub fn from_rows(&self, rows: &Rows) -> error::Result<PipelineBuilder> {
        let mut extractor = SqliteQueryExtractor::new(self.connection_params.clone(), self.query.clone())
            .with_connection(self.connection())
            .with_row_entry(ROW_ENTRY);
        for parameter in &self.parameters {
            extractor = extractor.with_parameter(parameter.name.clone(), parameter.to_value(rows)?);
        }
        Ok(Pipeline::builder()
            .read(extractor)
            .transform(StructureUnpack::new(ROW_ENTRY))
            .drop([ROW_ENTRY]))
    }
}

impl PartialEq for QueryDataFrameFactory {
    fn eq(&self, other: &Self) -> bool {
        self.connection_params == other.connection_params
            && self.query == other.query
            && self.parameters == other.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_types::{Entry, Row};

    fn ids(values: &[i64]) -> Rows {
        values
            .iter()
            .map(|id| Row::new(vec![Entry::integer("user_id", *id)]).unwrap())
            .collect()
    }

    #[test]
    fn scalar_reads_first_row_and_null_when_empty() {
        let param = QueryParameter::scalar("id", "user_id");
        assert_eq!(param.to_value(&ids(&[4, 9])).unwrap(), Value::Integer(4));
        assert_eq!(param.to_value(&Rows::empty()).unwrap(), Value::Null);
    }

    #[test]
    fn list_reads_every_row() {
        let param = QueryParameter::list("ids", "user_id");
        assert_eq!(
            param.to_value(&ids(&[1, 2])).unwrap(),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn missing_entry_is_reported() {
        let param = QueryParameter::list("ids", "account");
        let err = param.to_value(&ids(&[1])).unwrap_err();
        assert!(matches!(err, SqliteError::MissingEntry { ref entry, .. } if entry == "account"));
    }

    #[test]
    fn serializes_as_plain_configuration() {
        let factory = QueryDataFrameFactory::from_connection(
            ConnectionParams::new("app.db"),
            Connection::open_in_memory().unwrap(),
            "SELECT * FROM users WHERE id = :id",
            vec![QueryParameter::scalar("id", "user_id")],
        );
        let json = serde_json::to_value(&factory).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "connection_params": {"path": "app.db", "read_only": false},
                "query": "SELECT * FROM users WHERE id = :id",
                "parameters": [{"name": "id", "entry": "user_id", "kind": "scalar"}],
            })
        );

        let back: QueryDataFrameFactory = serde_json::from_value(json).unwrap();
        assert_eq!(back, factory);
        assert!(back.connection.get().is_none());
    }
}
