//! Batches of rows, the unit of flow between pipeline stages.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::partition::{Partition, PartitionKey};
use crate::row::Row;
use crate::schema::{Definition, Schema};

/// Sort direction for [`Rows::sort_by_entry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Ordered batch of rows.
///
/// Rows in one batch should share a schema but are not required to.
/// Every operation returns a new batch; equality is ordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rows {
    rows: Vec<Row>,
}

impl Rows {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Row> {
        self.rows
    }

    #[must_use]
    pub fn map<F>(&self, f: F) -> Self
    where
        F: FnMut(&Row) -> Row,
    {
        Self {
            rows: self.rows.iter().map(f).collect(),
        }
    }

    /// Fallible map; stops at the first error.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map<F, E>(&self, f: F) -> Result<Self, E>
    where
        F: FnMut(&Row) -> Result<Row, E>,
    {
        Ok(Self {
            rows: self.rows.iter().map(f).collect::<Result<_, _>>()?,
        })
    }

    #[must_use]
    pub fn filter<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Row) -> bool,
    {
        Self {
            rows: self.rows.iter().filter(|row| f(row)).cloned().collect(),
        }
    }

    /// Fallible filter; stops at the first error.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_filter<F, E>(&self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&Row) -> Result<bool, E>,
    {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            if f(row)? {
                rows.push(row.clone());
            }
        }
        Ok(Self { rows })
    }

    /// Stable sort: rows comparing equal keep their input order.
    #[must_use]
    pub fn sort_by<F>(&self, compare: F) -> Self
    where
        F: FnMut(&Row, &Row) -> Ordering,
    {
        let mut rows = self.rows.clone();
        rows.sort_by(compare);
        Self { rows }
    }

    /// Stable sort on one entry using [`crate::Value::total_cmp`]. Rows where the
    /// entry is missing or null sort last regardless of `order`; values of
    /// different kinds are grouped by kind.
    #[must_use]
    pub fn sort_by_entry(&self, name: &str, order: SortOrder) -> Self {
        self.sort_by(|a, b| {
            let left = a.get(name).filter(|e| !e.is_null()).map(|e| e.value());
            let right = b.get(name).filter(|e| !e.is_null()).map(|e| e.value());
            match (left, right) {
                (Some(l), Some(r)) => {
                    let ord = l.total_cmp(r);
                    match order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }

    /// Split into sub-batches of at most `size` rows without reordering.
    /// Returns an empty list when `size` is zero or the batch is empty.
    #[must_use]
    pub fn chunk_by(&self, size: usize) -> Vec<Rows> {
        if size == 0 {
            return Vec::new();
        }
        self.rows
            .chunks(size)
            .map(|chunk| Self {
                rows: chunk.to_vec(),
            })
            .collect()
    }

    /// Concatenate, keeping this batch first.
    #[must_use]
    pub fn merge(&self, other: &Rows) -> Self {
        let mut rows = Vec::with_capacity(self.rows.len() + other.rows.len());
        rows.extend(self.rows.iter().cloned());
        rows.extend(other.rows.iter().cloned());
        Self { rows }
    }

    /// First `n` rows.
    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        Self {
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Group rows by key. Partitions appear in order of first occurrence of
    /// their key; rows inside a partition keep source order.
    #[must_use]
    pub fn partition_by<F>(&self, mut key_fn: F) -> Vec<Partition>
    where
        F: FnMut(&Row) -> PartitionKey,
    {
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();
        let mut groups: Vec<(PartitionKey, Vec<Row>)> = Vec::new();
        for row in &self.rows {
            let key = key_fn(row);
            if let Some(&slot) = index.get(&key) {
                groups[slot].1.push(row.clone());
            } else {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row.clone()]));
            }
        }
        groups
            .into_iter()
            .map(|(key, rows)| Partition {
                key,
                rows: Self { rows },
            })
            .collect()
    }

    /// Infer a schema as the union of every row's entries. Entries missing
    /// from some rows, or null in some rows, are nullable.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Conflict`] if one name carries two types.
    pub fn schema(&self) -> Result<Schema, SchemaError> {
        let mut definitions: Vec<Definition> = Vec::new();
        let mut seen_in: Vec<usize> = Vec::new();
        for row in &self.rows {
            for entry in row.iter() {
                match definitions.iter().position(|d| d.name == entry.name()) {
                    Some(idx) => {
                        let def = &mut definitions[idx];
                        if def.data_type != *entry.data_type() {
                            return Err(SchemaError::Conflict {
                                name: def.name.clone(),
                                left: def.data_type.clone(),
                                right: entry.data_type().clone(),
                            });
                        }
                        def.nullable |= entry.is_nullable() || entry.is_null();
                        seen_in[idx] += 1;
                    }
                    None => {
                        definitions.push(Definition::new(
                            entry.name(),
                            entry.data_type().clone(),
                            entry.is_nullable() || entry.is_null(),
                        ));
                        seen_in.push(1);
                    }
                }
            }
        }
        for (def, count) in definitions.iter_mut().zip(&seen_in) {
            if *count < self.rows.len() {
                def.nullable = true;
            }
        }
        Schema::new(definitions)
    }
}

impl From<Vec<Row>> for Rows {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

impl FromIterator<Row> for Rows {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
