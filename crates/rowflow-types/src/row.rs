//! One logical record: an ordered, name-unique set of entries.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::RowError;
use crate::schema::Schema;

/// Ordered collection of entries with unique names.
///
/// Entries are held behind `Arc`, so every derived row shares the entries
/// it did not touch with the row it came from. Equality ignores entry
/// order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<Entry>", try_from = "Vec<Entry>")]
pub struct Row {
    entries: Vec<Arc<Entry>>,
}

impl Row {
    /// Build a row from entries, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::DuplicateEntry`] on the first repeated name.
    pub fn new(entries: Vec<Entry>) -> Result<Self, RowError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name()) {
                return Err(RowError::DuplicateEntry(entry.name().to_string()));
            }
        }
        Ok(Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.name() == name)
            .map(AsRef::as_ref)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(Entry::name).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name() == name)
    }

    /// Replace the entry with the same name in place, or append it.
    #[must_use]
    pub fn set(&self, entry: Entry) -> Self {
        let mut entries = self.entries.clone();
        match self.position(entry.name()) {
            Some(idx) => entries[idx] = Arc::new(entry),
            None => entries.push(Arc::new(entry)),
        }
        Self { entries }
    }

    /// Drop the named entry. Absent names are a no-op.
    #[must_use]
    pub fn remove(&self, name: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|entry| entry.name() != name)
                .cloned()
                .collect(),
        }
    }

    #[must_use]
    pub fn remove_all(&self, names: &[String]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|entry| !names.iter().any(|n| n == entry.name()))
                .cloned()
                .collect(),
        }
    }

    /// Keep only the listed entries, in the listed order. Names missing
    /// from the row are skipped.
    #[must_use]
    pub fn select(&self, names: &[String]) -> Self {
        Self {
            entries: names
                .iter()
                .filter_map(|name| self.position(name).map(|idx| Arc::clone(&self.entries[idx])))
                .collect(),
        }
    }

    /// Rename an entry, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::MissingEntry`] if `from` is absent and
    /// [`RowError::DuplicateEntry`] if `to` already names another entry.
    pub fn rename(&self, from: &str, to: &str) -> Result<Self, RowError> {
        let idx = self
            .position(from)
            .ok_or_else(|| RowError::MissingEntry(from.to_string()))?;
        if from == to {
            return Ok(self.clone());
        }
        if self.has(to) {
            return Err(RowError::DuplicateEntry(to.to_string()));
        }
        let mut entries = self.entries.clone();
        entries[idx] = Arc::new(self.entries[idx].rename(to));
        Ok(Self { entries })
    }

    /// Map every entry, keeping each entry's name and position. A name
    /// returned by `f` is discarded; use [`Self::try_map`] to rename.
    #[must_use]
    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Entry) -> Entry,
    {
        let entries = self
            .iter()
            .map(|entry| {
                let mapped = f(entry);
                if mapped.name() == entry.name() {
                    Arc::new(mapped)
                } else {
                    Arc::new(mapped.rename(entry.name()))
                }
            })
            .collect();
        Self { entries }
    }

    /// Map every entry, allowing renames.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::DuplicateEntry`] if the mapping produces two
    /// entries with the same name.
    pub fn try_map<F>(&self, f: F) -> Result<Self, RowError>
    where
        F: FnMut(&Entry) -> Entry,
    {
        Self::new(self.iter().map(f).collect())
    }

    /// Schema of this row alone.
    #[must_use]
    pub fn schema(&self) -> Schema {
        Schema::from_definitions_unchecked(self.iter().map(Entry::definition).collect())
    }

    /// Render the row as a flat JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|entry| (entry.name().to_string(), entry.value().to_json()))
                .collect(),
        )
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|entry| other.get(entry.name()).is_some_and(|o| o == entry))
    }
}

impl From<Row> for Vec<Entry> {
    fn from(row: Row) -> Self {
        row.entries
            .into_iter()
            .map(|entry| Arc::try_unwrap(entry).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

impl TryFrom<Vec<Entry>> for Row {
    type Error = RowError;

    fn try_from(entries: Vec<Entry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sample() -> Row {
        Row::new(vec![
            Entry::integer("id", 1),
            Entry::string("name", "ada"),
            Entry::boolean("active", true),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Row::new(vec![Entry::integer("a", 1), Entry::integer("a", 2)]).unwrap_err();
        assert_eq!(err, RowError::DuplicateEntry("a".into()));
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!(Row::new(vec![Entry::integer("a", 1), Entry::integer("A", 2)]).is_ok());
    }

    #[test]
    fn set_replaces_in_place_and_appends() {
        let row = sample();
        let replaced = row.set(Entry::string("name", "grace"));
        assert_eq!(replaced.names(), vec!["id", "name", "active"]);
        assert_eq!(
            replaced.get("name").unwrap().value(),
            &Value::String("grace".into())
        );

        let appended = row.set(Entry::float("score", 1.5));
        assert_eq!(appended.names(), vec!["id", "name", "active", "score"]);
        // original untouched
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn derived_rows_share_untouched_entries() {
        let row = sample();
        let derived = row.set(Entry::string("name", "grace"));
        assert!(Arc::ptr_eq(&row.entries[0], &derived.entries[0]));
        assert!(!Arc::ptr_eq(&row.entries[1], &derived.entries[1]));
    }

    #[test]
    fn map_keeps_names_even_when_closure_renames() {
        let row = sample();
        let mapped = row.map(|e| match e.value() {
            Value::Integer(i) => Entry::integer("id", i * 10),
            _ => e.rename("clash"),
        });
        assert_eq!(mapped.names(), vec!["id", "name", "active"]);
        assert_eq!(mapped.get("id").unwrap().value(), &Value::Integer(10));
        assert_eq!(mapped.get("name").unwrap().value(), &Value::String("ada".into()));

        let err = row.try_map(|e| e.rename("clash")).unwrap_err();
        assert_eq!(err, RowError::DuplicateEntry("clash".into()));
    }

    #[test]
    fn remove_absent_is_noop() {
        let row = sample();
        assert_eq!(row.remove("missing"), row);
        assert_eq!(row.remove("id").names(), vec!["name", "active"]);
    }

    #[test]
    fn rename_checks_collisions() {
        let row = sample();
        assert_eq!(
            row.rename("id", "name").unwrap_err(),
            RowError::DuplicateEntry("name".into())
        );
        assert_eq!(
            row.rename("nope", "x").unwrap_err(),
            RowError::MissingEntry("nope".into())
        );
        let renamed = row.rename("id", "user_id").unwrap();
        assert_eq!(renamed.names(), vec!["user_id", "name", "active"]);
    }

    #[test]
    fn equality_ignores_order() {
        let a = Row::new(vec![Entry::integer("a", 1), Entry::integer("b", 2)]).unwrap();
        let b = Row::new(vec![Entry::integer("b", 2), Entry::integer("a", 1)]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, a.set(Entry::integer("b", 3)));
    }

    #[test]
    fn select_follows_requested_order() {
        let row = sample();
        let picked = row.select(&["active".into(), "id".into(), "ghost".into()]);
        assert_eq!(picked.names(), vec!["active", "id"]);
    }

    #[test]
    fn serde_roundtrip_preserves_order() {
        let row = sample();
        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back.names(), row.names());
        assert_eq!(back, row);
    }
}
