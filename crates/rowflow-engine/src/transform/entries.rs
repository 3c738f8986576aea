//! Transformers that reshape the entries of each row.

use serde::{Deserialize, Serialize};

use rowflow_types::{Entry, Row, Rows, Value};

use crate::errors::{SerializationError, TransformError};
use crate::expr::{EvalError, Expression};
use crate::stage::{ConfigStage, StageSpec};
use crate::transform::Transformer;

/// Derive or replace the entry `name` from an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithEntry {
    pub name: String,
    pub expression: Expression,
}

impl WithEntry {
    pub fn new(name: impl Into<String>, expression: impl Into<Expression>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

impl ConfigStage for WithEntry {
    const KIND: &'static str = "with_entry";
}

impl Transformer for WithEntry {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        rows.try_map(|row| {
            let entry = self
                .expression
                .eval(row)
                .map_err(|e| TransformError::new(Self::KIND, e))?;
            Ok(row.set(entry.rename(self.name.as_str())))
        })
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Remove entries by name. Absent names are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEntries {
    pub names: Vec<String>,
}

impl DropEntries {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigStage for DropEntries {
    const KIND: &'static str = "drop";
}

impl Transformer for DropEntries {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        Ok(rows.map(|row| row.remove_all(&self.names)))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Keep only the listed entries, in the listed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Select {
    pub names: Vec<String>,
}

impl Select {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigStage for Select {
    const KIND: &'static str = "select";
}

impl Transformer for Select {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        Ok(rows.map(|row| row.select(&self.names)))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Rename one entry. Every row must carry `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

impl Rename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl ConfigStage for Rename {
    const KIND: &'static str = "rename";
}

impl Transformer for Rename {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        rows.try_map(|row| {
            row.rename(&self.from, &self.to)
                .map_err(|e| TransformError::new(Self::KIND, e))
        })
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Lift the nested entries of a structure entry to the top level.
///
/// Lifted entries are named `prefix + field` and replace same-named
/// entries already in the row. Fields listed in `skip` stay nested. A null
/// structure lifts nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureUnpack {
    pub entry: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub skip: Vec<String>,
    /// Remove the structure entry after unpacking.
    #[serde(default)]
    pub drop_source: bool,
}

impl StructureUnpack {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            prefix: String::new(),
            skip: Vec::new(),
            drop_source: false,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn skipping<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn dropping_source(mut self) -> Self {
        self.drop_source = true;
        self
    }

    fn unpack(&self, row: &Row) -> Result<Row, TransformError> {
        let source = row.get(&self.entry).ok_or_else(|| {
            TransformError::new(
                Self::KIND,
                EvalError::MissingField {
                    field: self.entry.clone(),
                },
            )
        })?;
        let fields: &[Entry] = match source.value() {
            Value::Structure(fields) => fields,
            Value::Null => &[],
            other => {
                return Err(TransformError::precondition(
                    Self::KIND,
                    format!("entry '{}' is a {}, not a structure", self.entry, other.kind()),
                ))
            }
        };
        let mut out = row.clone();
        for field in fields.iter().filter(|f| !self.skip.iter().any(|s| s == f.name())) {
            out = out.set(field.rename(format!("{}{}", self.prefix, field.name())));
        }
        if self.drop_source && !self.lifts_onto_source(fields) {
            out = out.remove(&self.entry);
        }
        Ok(out)
    }

    /// A lifted field named like the source replaced it; keep that one.
    fn lifts_onto_source(&self, fields: &[Entry]) -> bool {
        fields
            .iter()
            .filter(|f| !self.skip.iter().any(|s| s == f.name()))
            .any(|f| format!("{}{}", self.prefix, f.name()) == self.entry)
    }
}

impl ConfigStage for StructureUnpack {
    const KIND: &'static str = "structure_unpack";
}

impl Transformer for StructureUnpack {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        rows.try_map(|row| self.unpack(row))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}
