//! Loader contract plus the output and in-memory loaders.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rowflow_types::{PartitionKey, Row, Rows};

use crate::errors::{LoadError, SerializationError};
use crate::stage::StageSpec;

#[async_trait]
pub trait Loader: Send {
    fn name(&self) -> &str;

    /// Write one batch. Called repeatedly with disjoint batches.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the sink rejects or cannot receive the batch.
    async fn load(&mut self, rows: Rows) -> Result<(), LoadError>;

    /// Write one partition of a batch. Partition-aware sinks override
    /// this; the default ignores the key.
    ///
    /// # Errors
    ///
    /// Same as [`Loader::load`].
    async fn load_partition(&mut self, key: &PartitionKey, rows: Rows) -> Result<(), LoadError> {
        let _ = key;
        self.load(rows).await
    }

    /// Called exactly once per run after the last batch, on success and
    /// failure alike.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if flushing or releasing the sink fails.
    async fn finalize(&mut self) -> Result<(), LoadError> {
        Ok(())
    }

    /// Portable description of this loader.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::NotSerializable`] for loaders that
    /// only exist in-process.
    fn to_spec(&self) -> Result<StageSpec, SerializationError>;
}

// ---------------------------------------------------------------------------
// OutputLoader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// ASCII table per batch.
    #[default]
    Table,
    /// One JSON object per row.
    Json,
}

pub const DEFAULT_TRUNCATE: usize = 20;

fn default_truncate() -> Option<usize> {
    Some(DEFAULT_TRUNCATE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Cut rendered values to this many characters; `None` disables.
    #[serde(default = "default_truncate")]
    pub truncate: Option<usize>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            truncate: default_truncate(),
            format: OutputFormat::Table,
        }
    }
}

/// Shared writer an [`OutputLoader`] renders into instead of stdout.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Renders every batch to stdout (or a provided writer).
pub struct OutputLoader {
    config: OutputConfig,
    writer: Option<SharedWriter>,
}

impl OutputLoader {
    pub const KIND: &'static str = "output";

    #[must_use]
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config,
            writer: None,
        }
    }

    /// Render into `writer` instead of stdout. The writer is not encoded;
    /// a decoded loader writes to stdout.
    #[must_use]
    pub fn with_writer(mut self, writer: SharedWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Registry decoder.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::InvalidConfig`] on a malformed config.
    pub fn decode(spec: &StageSpec) -> Result<Box<dyn Loader>, SerializationError> {
        Ok(Box::new(Self::new(spec.decode()?)))
    }

    fn render(&self, rows: &Rows) -> String {
        match self.config.format {
            OutputFormat::Table => render_table(rows, self.config.truncate),
            OutputFormat::Json => rows
                .iter()
                .map(|row| format!("{}\n", row.to_json()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for OutputLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputLoader")
            .field("config", &self.config)
            .field("captured", &self.writer.is_some())
            .finish()
    }
}

#[async_trait]
impl Loader for OutputLoader {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn load(&mut self, rows: Rows) -> Result<(), LoadError> {
        let rendered = self.render(&rows);
        let result = match &self.writer {
            Some(writer) => writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(rendered.as_bytes()),
            None => std::io::stdout().lock().write_all(rendered.as_bytes()),
        };
        result.map_err(|e| LoadError::unreachable(format!("output write failed: {e}")))
    }

    async fn finalize(&mut self) -> Result<(), LoadError> {
        let result = match &self.writer {
            Some(writer) => writer.lock().unwrap_or_else(PoisonError::into_inner).flush(),
            None => std::io::stdout().lock().flush(),
        };
        result.map_err(|e| LoadError::unreachable(format!("output flush failed: {e}")))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        StageSpec::encode(Self::KIND, &self.config)
    }
}

fn cell(row: &Row, name: &str, truncate: Option<usize>) -> String {
    let text = row
        .get(name)
        .map_or_else(String::new, |entry| entry.value().to_string());
    match truncate {
        Some(max) if text.chars().count() > max => {
            format!("{}...", text.chars().take(max).collect::<String>())
        }
        _ => text,
    }
}

/// ASCII table with one column per entry name, in first-seen order, and a
/// trailing row count.
fn render_table(rows: &Rows, truncate: Option<usize>) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for name in row.names() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| cell(row, c, truncate)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = format!(
        "+{}+\n",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let line = |values: Vec<&str>| {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!(" {v:>w$} "))
            .collect();
        format!("|{}|\n", padded.join("|"))
    };

    let mut out = String::new();
    if !columns.is_empty() {
        out.push_str(&border);
        out.push_str(&line(columns.clone()));
        out.push_str(&border);
        for row in &cells {
            out.push_str(&line(row.iter().map(String::as_str).collect()));
        }
        out.push_str(&border);
    }
    out.push_str(&format!("{} rows\n", rows.len()));
    out
}

// ---------------------------------------------------------------------------
// MemoryLoader
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    batches: Vec<(PartitionKey, Rows)>,
    finalized: usize,
}

/// Read side of a [`MemoryLoader`]; clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHandle {
    fn with<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Every loaded batch, in load order.
    #[must_use]
    pub fn batches(&self) -> Vec<Rows> {
        self.with(|s| s.batches.iter().map(|(_, rows)| rows.clone()).collect())
    }

    /// Partition keys of the loaded batches, in load order.
    #[must_use]
    pub fn keys(&self) -> Vec<PartitionKey> {
        self.with(|s| s.batches.iter().map(|(key, _)| key.clone()).collect())
    }

    /// All loaded rows concatenated.
    #[must_use]
    pub fn rows(&self) -> Rows {
        self.with(|s| s.batches.iter().flat_map(|(_, rows)| rows.iter().cloned()).collect())
    }

    /// How many times `finalize` was called.
    #[must_use]
    pub fn finalize_count(&self) -> usize {
        self.with(|s| s.finalized)
    }
}

/// Collects batches in memory for inspection. Not serializable.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    handle: MemoryHandle,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&mut self, rows: Rows) -> Result<(), LoadError> {
        self.load_partition(&PartitionKey::unpartitioned(), rows).await
    }

    async fn load_partition(&mut self, key: &PartitionKey, rows: Rows) -> Result<(), LoadError> {
        self.handle
            .with(|s| s.batches.push((key.clone(), rows)));
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), LoadError> {
        self.handle.with(|s| s.finalized += 1);
        Ok(())
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        Err(SerializationError::NotSerializable("memory".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_types::Entry;

    fn math_row() -> Rows {
        Rows::new(vec![Row::new(vec![
            Entry::integer("a", 100),
            Entry::integer("b", 200),
        ])
        .unwrap()])
    }

    fn captured(config: OutputConfig, rows: Rows) -> String {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let writer: SharedWriter = buffer.clone();
        let mut loader = OutputLoader::new(config).with_writer(writer);
        futures::executor::block_on(async {
            loader.load(rows).await.unwrap();
            loader.finalize().await.unwrap();
        });
        let bytes = buffer.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn table_output() {
        let out = captured(OutputConfig::default(), math_row());
        assert_eq!(
            out,
            "+-----+-----+\n|   a |   b |\n+-----+-----+\n| 100 | 200 |\n+-----+-----+\n1 rows\n"
        );
    }

    #[test]
    fn table_truncates_long_values() {
        let rows = Rows::new(vec![Row::new(vec![Entry::string("s", "abcdefgh")]).unwrap()]);
        let out = captured(
            OutputConfig {
                truncate: Some(3),
                format: OutputFormat::Table,
            },
            rows.clone(),
        );
        assert!(out.contains("abc..."));
        let full = captured(
            OutputConfig {
                truncate: None,
                format: OutputFormat::Table,
            },
            rows,
        );
        assert!(full.contains("abcdefgh"));
    }

    #[test]
    fn json_output_is_one_line_per_row() {
        let out = captured(
            OutputConfig {
                truncate: None,
                format: OutputFormat::Json,
            },
            math_row(),
        );
        assert_eq!(out, "{\"a\":100,\"b\":200}\n");
    }

    #[test]
    fn output_spec_drops_writer() {
        let writer: SharedWriter = Arc::new(Mutex::new(Vec::<u8>::new()));
        let loader = OutputLoader::new(OutputConfig {
            truncate: None,
            format: OutputFormat::Json,
        })
        .with_writer(writer);
        let spec = loader.to_spec().unwrap();
        assert_eq!(spec.kind, "output");
        let back: OutputConfig = spec.decode().unwrap();
        assert_eq!(&back, loader.config());
    }

    #[test]
    fn output_config_defaults_to_truncated_table() {
        let config: OutputConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, OutputConfig::default());
        assert_eq!(config.truncate, Some(20));
    }

    #[tokio::test]
    async fn memory_loader_records_batches_and_finalize() {
        let mut loader = MemoryLoader::new();
        let handle = loader.handle();
        loader.load(math_row()).await.unwrap();
        loader
            .load_partition(&PartitionKey::new("k=1"), math_row())
            .await
            .unwrap();
        loader.finalize().await.unwrap();
        assert_eq!(handle.batches().len(), 2);
        assert_eq!(handle.rows().len(), 2);
        assert_eq!(handle.keys()[1].as_str(), "k=1");
        assert_eq!(handle.finalize_count(), 1);
        assert!(loader.to_spec().is_err());
    }
}
