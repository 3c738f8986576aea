//! A single named, typed value.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::schema::Definition;
use crate::value::{DataType, Value};

/// Atomic unit of a record.
///
/// The value always satisfies the declared type; a null value is only
/// possible on a nullable entry. Entries are immutable: every derivation
/// returns a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct Entry {
    name: String,
    data_type: DataType,
    nullable: bool,
    value: Value,
}

#[derive(Deserialize)]
struct RawEntry {
    name: String,
    data_type: DataType,
    #[serde(default)]
    nullable: bool,
    value: Value,
}

impl TryFrom<RawEntry> for Entry {
    type Error = TypeError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.data_type, raw.nullable, raw.value)
    }
}

impl Entry {
    /// Build an entry, checking the value against the declared type.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError`] if the name is empty, the value does not match
    /// `data_type`, or the value is null on a non-nullable entry.
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
        value: Value,
    ) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::EmptyName);
        }
        check_value(&name, &data_type, nullable, &value)?;
        Ok(Self {
            name,
            data_type,
            nullable,
            value,
        })
    }

    #[must_use]
    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::unchecked(name, DataType::Integer, Value::Integer(value))
    }

    #[must_use]
    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self::unchecked(name, DataType::Float, Value::Float(value))
    }

    #[must_use]
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::unchecked(name, DataType::String, Value::String(value.into()))
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::unchecked(name, DataType::Boolean, Value::Boolean(value))
    }

    #[must_use]
    pub fn datetime(name: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self::unchecked(name, DataType::DateTime, Value::DateTime(value))
    }

    /// A null entry of the given type.
    #[must_use]
    pub fn null(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            value: Value::Null,
        }
    }

    /// A list entry whose items must all be `element` (or null).
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::Mismatch`] if an item has another type.
    pub fn list(
        name: impl Into<String>,
        element: DataType,
        items: Vec<Value>,
    ) -> Result<Self, TypeError> {
        Self::new(name, DataType::List(Box::new(element)), false, Value::List(items))
    }

    /// A structure entry nesting `entries`; the type is derived from them.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::DuplicateField`] if two nested entries share a name.
    pub fn structure(name: impl Into<String>, entries: Vec<Entry>) -> Result<Self, TypeError> {
        let name = name.into();
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name()) {
                return Err(TypeError::DuplicateField {
                    entry: name,
                    field: entry.name().to_string(),
                });
            }
        }
        let fields = entries.iter().map(Entry::definition).collect();
        Self::new(name, DataType::Structure(fields), false, Value::Structure(entries))
    }

    fn unchecked(name: impl Into<String>, data_type: DataType, value: Value) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            value,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Consume the entry, returning its value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Same entry, allowed to hold null.
    #[must_use]
    pub fn into_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn rename(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Derive a new entry by transforming the value. The type is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError`] if the new value no longer satisfies the type.
    pub fn map<F>(&self, f: F) -> Result<Self, TypeError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let value = f(&self.value);
        check_value(&self.name, &self.data_type, self.nullable, &value)?;
        Ok(Self {
            value,
            ..self.clone()
        })
    }

    /// Schema definition describing this entry.
    #[must_use]
    pub fn definition(&self) -> Definition {
        Definition::new(self.name.clone(), self.data_type.clone(), self.nullable)
    }
}

fn check_value(
    name: &str,
    data_type: &DataType,
    nullable: bool,
    value: &Value,
) -> Result<(), TypeError> {
    if value.is_null() {
        return if nullable {
            Ok(())
        } else {
            Err(TypeError::UnexpectedNull {
                entry: name.to_string(),
            })
        };
    }
    if data_type.accepts(value) {
        Ok(())
    } else {
        Err(TypeError::Mismatch {
            entry: name.to_string(),
            expected: data_type.clone(),
            actual: value.kind(),
        })
    }
}
