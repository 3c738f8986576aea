//! Declared shape of a batch.
//!
//! A [`Schema`] is an ordered list of [`Definition`]s with unique names.
//! It validates incoming batches, fixes column layouts for tabular sinks,
//! and merges or compares the shapes of several sources.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::rows::Rows;
use crate::value::DataType;

/// One column definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl Definition {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// How [`Schema::validate`] treats entries the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// Undeclared entries are an error.
    #[default]
    Strict,
    /// Undeclared entries are ignored.
    Lenient,
}

/// Ordered set of definitions with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Definition>", into = "Vec<Definition>")]
pub struct Schema {
    definitions: Vec<Definition>,
}

impl Schema {
    /// Build a schema, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateDefinition`] on a repeated name.
    pub fn new(definitions: Vec<Definition>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(definitions.len());
        for def in &definitions {
            if !seen.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateDefinition(def.name.clone()));
            }
        }
        Ok(Self { definitions })
    }

    /// Caller guarantees unique names (e.g. derived from a row).
    pub(crate) fn from_definitions_unchecked(definitions: Vec<Definition>) -> Self {
        Self { definitions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.iter().find(|def| def.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|def| def.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter()
    }

    /// Check every row of `rows` against this schema.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found, naming the row index.
    pub fn validate(&self, rows: &Rows, mode: SchemaMode) -> Result<(), SchemaError> {
        for (idx, row) in rows.iter().enumerate() {
            for def in &self.definitions {
                match row.get(&def.name) {
                    None if def.nullable => {}
                    None => {
                        return Err(SchemaError::MissingEntry {
                            row: idx,
                            name: def.name.clone(),
                        })
                    }
                    Some(entry) if entry.is_null() => {
                        if !def.nullable {
                            return Err(SchemaError::UnexpectedNull {
                                row: idx,
                                name: def.name.clone(),
                            });
                        }
                    }
                    Some(entry) => {
                        if *entry.data_type() != def.data_type {
                            return Err(SchemaError::TypeMismatch {
                                row: idx,
                                name: def.name.clone(),
                                expected: def.data_type.clone(),
                                actual: entry.data_type().clone(),
                            });
                        }
                    }
                }
            }
            if mode == SchemaMode::Strict {
                if let Some(extra) = row.iter().find(|entry| self.get(entry.name()).is_none()) {
                    return Err(SchemaError::UnexpectedEntry {
                        row: idx,
                        name: extra.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Union of two schemas. Definitions keep this schema's order followed
    /// by the new names of `other`; a name present on one side only becomes
    /// nullable.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Conflict`] when a name has different types.
    pub fn merge(&self, other: &Schema) -> Result<Schema, SchemaError> {
        let mut definitions = Vec::with_capacity(self.len() + other.len());
        for def in &self.definitions {
            match other.get(&def.name) {
                Some(theirs) => {
                    if theirs.data_type != def.data_type {
                        return Err(SchemaError::Conflict {
                            name: def.name.clone(),
                            left: def.data_type.clone(),
                            right: theirs.data_type.clone(),
                        });
                    }
                    definitions.push(Definition {
                        nullable: def.nullable || theirs.nullable,
                        ..def.clone()
                    });
                }
                None => definitions.push(Definition {
                    nullable: true,
                    ..def.clone()
                }),
            }
        }
        for theirs in &other.definitions {
            if self.get(&theirs.name).is_none() {
                definitions.push(Definition {
                    nullable: true,
                    ..theirs.clone()
                });
            }
        }
        Ok(Schema { definitions })
    }

    /// Definitions present in both schemas with the same type, in this
    /// schema's order. Nullable if either side is.
    #[must_use]
    pub fn intersect(&self, other: &Schema) -> Schema {
        let definitions = self
            .definitions
            .iter()
            .filter_map(|def| {
                other
                    .get(&def.name)
                    .filter(|theirs| theirs.data_type == def.data_type)
                    .map(|theirs| Definition {
                        nullable: def.nullable || theirs.nullable,
                        ..def.clone()
                    })
            })
            .collect();
        Schema { definitions }
    }

    /// Strict equality: same definitions in the same order.
    #[must_use]
    pub fn matches(&self, other: &Schema) -> bool {
        self.definitions == other.definitions
    }
}

impl From<Schema> for Vec<Definition> {
    fn from(schema: Schema) -> Self {
        schema.definitions
    }
}

impl TryFrom<Vec<Definition>> for Schema {
    type Error = SchemaError;

    fn try_from(definitions: Vec<Definition>) -> Result<Self, Self::Error> {
        Self::new(definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::row::Row;

    fn users_schema() -> Schema {
        Schema::new(vec![
            Definition::new("id", DataType::Integer, false),
            Definition::new("email", DataType::String, true),
        ])
        .unwrap()
    }

    fn rows(rows: Vec<Vec<Entry>>) -> Rows {
        Rows::new(rows.into_iter().map(|r| Row::new(r).unwrap()).collect())
    }

    #[test]
    fn rejects_duplicates() {
        let err = Schema::new(vec![
            Definition::new("id", DataType::Integer, false),
            Definition::new("id", DataType::String, false),
        ])
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateDefinition("id".into()));
    }

    #[test]
    fn validate_accepts_missing_nullable() {
        let batch = rows(vec![vec![Entry::integer("id", 1)]]);
        users_schema().validate(&batch, SchemaMode::Strict).unwrap();
    }

    #[test]
    fn validate_reports_missing_required() {
        let batch = rows(vec![
            vec![Entry::integer("id", 1)],
            vec![Entry::string("email", "a@b.c")],
        ]);
        let err = users_schema().validate(&batch, SchemaMode::Strict).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingEntry {
                row: 1,
                name: "id".into()
            }
        );
    }

    #[test]
    fn validate_type_mismatch() {
        let batch = rows(vec![vec![Entry::string("id", "one")]]);
        let err = users_schema().validate(&batch, SchemaMode::Strict).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { row: 0, .. }));
    }

    #[test]
    fn strict_rejects_extra_but_lenient_ignores() {
        let batch = rows(vec![vec![Entry::integer("id", 1), Entry::boolean("admin", true)]]);
        assert!(matches!(
            users_schema().validate(&batch, SchemaMode::Strict),
            Err(SchemaError::UnexpectedEntry { .. })
        ));
        users_schema().validate(&batch, SchemaMode::Lenient).unwrap();
    }

    #[test]
    fn merge_unions_and_relaxes_nullability() {
        let other = Schema::new(vec![
            Definition::new("id", DataType::Integer, false),
            Definition::new("age", DataType::Integer, false),
        ])
        .unwrap();
        let merged = users_schema().merge(&other).unwrap();
        assert_eq!(merged.names(), vec!["id", "email", "age"]);
        assert!(!merged.get("id").unwrap().nullable);
        assert!(merged.get("age").unwrap().nullable);
    }

    #[test]
    fn merge_detects_conflicts() {
        let other = Schema::new(vec![Definition::new("id", DataType::String, false)]).unwrap();
        assert!(matches!(
            users_schema().merge(&other),
            Err(SchemaError::Conflict { .. })
        ));
    }

    #[test]
    fn intersect_and_matches() {
        let other = Schema::new(vec![
            Definition::new("email", DataType::String, false),
            Definition::new("id", DataType::Integer, true),
        ])
        .unwrap();
        let common = users_schema().intersect(&other);
        assert_eq!(common.names(), vec!["id", "email"]);
        assert!(common.get("id").unwrap().nullable);
        assert!(!users_schema().matches(&other));
        assert!(users_schema().matches(&users_schema()));
    }

    #[test]
    fn deserialize_rejects_duplicates() {
        let json = r#"[{"name":"a","data_type":{"type":"integer"}},{"name":"a","data_type":{"type":"string"}}]"#;
        assert!(serde_json::from_str::<Schema>(json).is_err());
    }
}
