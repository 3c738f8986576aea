//! Transformers that select or reorder whole rows.

use serde::{Deserialize, Serialize};

use rowflow_types::{Rows, SortOrder};

use crate::errors::{SerializationError, TransformError};
use crate::expr::Expression;
use crate::stage::{ConfigStage, StageSpec};
use crate::transform::Transformer;

/// Keep rows whose condition is `true`. Null and `false` drop the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub condition: Expression,
}

impl Filter {
    pub fn new(condition: impl Into<Expression>) -> Self {
        Self {
            condition: condition.into(),
        }
    }
}

impl ConfigStage for Filter {
    const KIND: &'static str = "filter";
}

impl Transformer for Filter {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        rows.try_filter(|row| {
            self.condition
                .eval_predicate(row)
                .map(|keep| keep == Some(true))
                .map_err(|e| TransformError::new(Self::KIND, e))
        })
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Stable sort inside each batch. Batches are not merged, so the order is
/// global only for single-batch streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub entry: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortBy {
    pub fn new(entry: impl Into<String>, order: SortOrder) -> Self {
        Self {
            entry: entry.into(),
            order,
        }
    }
}

impl ConfigStage for SortBy {
    const KIND: &'static str = "sort_by";
}

impl Transformer for SortBy {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        Ok(rows.sort_by_entry(&self.entry, self.order))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Pass the first `limit` rows of the stream, then empty every batch.
///
/// Stateful: the count spans batches, so the result depends on batch
/// order. Under parallel workers the limit applies per worker. The count
/// is runtime state and is neither encoded nor compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limit {
    pub limit: usize,
    #[serde(skip)]
    passed: usize,
}

impl Limit {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit, passed: 0 }
    }
}

impl PartialEq for Limit {
    fn eq(&self, other: &Self) -> bool {
        self.limit == other.limit
    }
}

impl Eq for Limit {}

impl ConfigStage for Limit {
    const KIND: &'static str = "limit";
}

impl Transformer for Limit {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn transform(&mut self, rows: Rows) -> Result<Rows, TransformError> {
        let remaining = self.limit.saturating_sub(self.passed);
        let out = rows.take(remaining);
        self.passed += out.len();
        Ok(out)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}
