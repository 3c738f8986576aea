//! Extractor contract and the in-memory rows extractor.

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use rowflow_types::Rows;

use crate::errors::{ExtractError, SerializationError};
use crate::stage::{ConfigStage, StageSpec};

pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Lazy, finite stream of batches produced by an extractor.
pub type RowsStream<'a> = BoxStream<'a, Result<Rows, ExtractError>>;

/// Per-run information handed to [`Extractor::extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractContext {
    pub worker_index: u32,
    pub worker_count: u32,
    /// Preferred batch size. Extractors may use their own.
    pub batch_size: usize,
}

impl Default for ExtractContext {
    fn default() -> Self {
        Self {
            worker_index: 0,
            worker_count: 1,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ExtractContext {
    /// Whether the record at `position` belongs to this worker. Positions
    /// are split round-robin so the shards of all workers are disjoint and
    /// cover the whole source.
    #[must_use]
    pub fn owns(&self, position: usize) -> bool {
        if self.worker_count <= 1 {
            return true;
        }
        position % self.worker_count as usize == self.worker_index as usize
    }
}

pub trait Extractor: Send {
    fn name(&self) -> &str;

    /// Start producing batches. Batches are pulled one at a time; nothing
    /// is read before the first poll. With `worker_count > 1` the
    /// extractor emits only this worker's shard.
    fn extract<'a>(&'a mut self, ctx: &ExtractContext) -> RowsStream<'a>;

    /// Portable description of this extractor.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the extractor holds state that
    /// cannot be encoded.
    fn to_spec(&self) -> Result<StageSpec, SerializationError>;
}

/// Emits a fixed set of rows in chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsExtractor {
    pub rows: Rows,
    /// Overrides the pipeline batch size when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl RowsExtractor {
    #[must_use]
    pub fn new(rows: Rows) -> Self {
        Self {
            rows,
            batch_size: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

impl ConfigStage for RowsExtractor {
    const KIND: &'static str = "rows";
}

impl Extractor for RowsExtractor {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn extract<'a>(&'a mut self, ctx: &ExtractContext) -> RowsStream<'a> {
        let size = self.batch_size.unwrap_or(ctx.batch_size).max(1);
        let owned: Rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(position, _)| ctx.owns(*position))
            .map(|(_, row)| row.clone())
            .collect();
        stream::iter(owned.chunk_by(size).into_iter().map(Ok)).boxed()
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use rowflow_types::{Entry, Row};

    fn rows(n: i64) -> Rows {
        (0..n)
            .map(|i| Row::new(vec![Entry::integer("id", i)]).unwrap())
            .collect()
    }

    async fn collect(extractor: &mut RowsExtractor, ctx: ExtractContext) -> Vec<Rows> {
        extractor.extract(&ctx).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn chunks_by_context_batch_size() {
        let mut extractor = RowsExtractor::new(rows(5));
        let ctx = ExtractContext {
            batch_size: 2,
            ..ExtractContext::default()
        };
        let batches = collect(&mut extractor, ctx).await;
        assert_eq!(
            batches.iter().map(Rows::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
    }

    #[tokio::test]
    async fn own_batch_size_wins() {
        let mut extractor = RowsExtractor::new(rows(5)).with_batch_size(5);
        let batches = collect(&mut extractor, ExtractContext::default()).await;
        assert_eq!(batches.len(), 1);
    }

    #[tokio::test]
    async fn empty_source_yields_nothing() {
        let mut extractor = RowsExtractor::new(Rows::empty());
        assert!(collect(&mut extractor, ExtractContext::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn worker_shards_are_disjoint_and_complete() {
        let mut seen = Vec::new();
        for worker_index in 0..3 {
            let mut extractor = RowsExtractor::new(rows(10));
            let ctx = ExtractContext {
                worker_index,
                worker_count: 3,
                batch_size: 4,
            };
            for batch in collect(&mut extractor, ctx).await {
                seen.extend(batch.iter().map(|r| r.get("id").unwrap().value().clone()));
            }
        }
        assert_eq!(seen.len(), 10);
        let mut ids: Vec<String> = seen.iter().map(ToString::to_string).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn spec_roundtrip() {
        let extractor = RowsExtractor::new(rows(2)).with_batch_size(1);
        let spec = extractor.to_spec().unwrap();
        assert_eq!(spec.kind, "rows");
        assert_eq!(spec.decode::<RowsExtractor>().unwrap(), extractor);
    }
}
