//! Partition keys and the partitions produced by grouping a batch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::row::Row;
use crate::rows::Rows;

/// One named component of a key built from entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyValue {
    /// The row has no entry of that name.
    Missing,
    Null,
    /// A non-null value, identified by its type and rendered form.
    Value { data_type: String, text: String },
}

/// Key of a logical partition.
///
/// Keys built from entries compare by their typed components, so a null,
/// the string `"null"` and a missing entry are three different keys. The
/// rendered form is Hive-style (`country=PL/year=2024`) with `%`, `/` and
/// `=` percent-escaped inside values so it can double as a sink path
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    components: Vec<(String, KeyValue)>,
    rendered: String,
}

impl PartitionKey {
    /// Free-form key, identified by its text alone.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            components: Vec::new(),
            rendered: key.into(),
        }
    }

    /// Key of a batch that was not partitioned.
    #[must_use]
    pub fn unpartitioned() -> Self {
        Self::new(String::new())
    }

    /// Build a key from the values of `names` in `row`. Nulls and missing
    /// entries both render as `null` but stay distinct keys.
    #[must_use]
    pub fn from_entries(row: &Row, names: &[String]) -> Self {
        let components: Vec<(String, KeyValue)> = names
            .iter()
            .map(|name| {
                let value = match row.get(name) {
                    None => KeyValue::Missing,
                    Some(entry) if entry.is_null() => KeyValue::Null,
                    Some(entry) => KeyValue::Value {
                        data_type: entry.data_type().to_string(),
                        text: entry.value().to_string(),
                    },
                };
                (name.clone(), value)
            })
            .collect();
        let rendered = components
            .iter()
            .map(|(name, value)| match value {
                KeyValue::Missing | KeyValue::Null => format!("{}=null", escape(name)),
                KeyValue::Value { text, .. } => format!("{}={}", escape(name), escape(text)),
            })
            .collect::<Vec<_>>()
            .join("/");
        Self {
            components,
            rendered,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Components of a key built from entries; empty for free-form keys.
    #[must_use]
    pub fn components(&self) -> &[(String, KeyValue)] {
        &self.components
    }

    /// Unambiguous byte encoding of the key identity, stable across
    /// processes. Used for hashing keys into buckets.
    #[must_use]
    pub fn canonical(&self) -> String {
        if self.components.is_empty() {
            return format!("L{}:{}", self.rendered.len(), self.rendered);
        }
        let mut out = String::from("E");
        for (name, value) in &self.components {
            out.push_str(&format!("{}:{name}", name.len()));
            match value {
                KeyValue::Missing => out.push('M'),
                KeyValue::Null => out.push('N'),
                KeyValue::Value { data_type, text } => out.push_str(&format!(
                    "V{}:{data_type}{}:{text}",
                    data_type.len(),
                    text.len()
                )),
            }
        }
        out
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// A group of rows sharing one key, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub key: PartitionKey,
    pub rows: Rows,
}
