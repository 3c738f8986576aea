//! Partitioners split a batch into keyed groups before loading.

use serde::{Deserialize, Serialize};

use rowflow_types::{Partition, PartitionKey, Rows};

use crate::errors::SerializationError;
use crate::stage::{ConfigStage, StageSpec};

pub trait Partitioner: Send {
    /// Group `rows`. Groups appear in order of first occurrence and keep
    /// source order inside. An empty batch yields no partitions.
    fn partition(&self, rows: &Rows) -> Vec<Partition>;

    /// # Errors
    ///
    /// Returns [`SerializationError`] if the partitioner cannot be encoded.
    fn to_spec(&self) -> Result<StageSpec, SerializationError>;
}

/// The whole batch as one unkeyed partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinglePartition {}

impl ConfigStage for SinglePartition {
    const KIND: &'static str = "single";
}

impl Partitioner for SinglePartition {
    fn partition(&self, rows: &Rows) -> Vec<Partition> {
        if rows.is_empty() {
            return Vec::new();
        }
        vec![Partition {
            key: PartitionKey::unpartitioned(),
            rows: rows.clone(),
        }]
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Key from the values of the listed entries, e.g. `country=PL/year=2024`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByEntries {
    pub entries: Vec<String>,
}

impl ByEntries {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigStage for ByEntries {
    const KIND: &'static str = "by_entries";
}

impl Partitioner for ByEntries {
    fn partition(&self, rows: &Rows) -> Vec<Partition> {
        rows.partition_by(|row| PartitionKey::from_entries(row, &self.entries))
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

/// Spread rows over `buckets` by a stable hash of the listed entries.
/// Keys render as `bucket=N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashBuckets {
    pub entries: Vec<String>,
    pub buckets: u32,
}

impl HashBuckets {
    pub fn new<I, S>(entries: I, buckets: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            buckets,
        }
    }

    fn bucket_of(&self, key: &PartitionKey) -> u64 {
        fnv1a(key.canonical().as_bytes()) % u64::from(self.buckets.max(1))
    }
}

impl ConfigStage for HashBuckets {
    const KIND: &'static str = "hash_buckets";
}

impl Partitioner for HashBuckets {
    fn partition(&self, rows: &Rows) -> Vec<Partition> {
        rows.partition_by(|row| {
            let key = PartitionKey::from_entries(row, &self.entries);
            PartitionKey::new(format!("bucket={}", self.bucket_of(&key)))
        })
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        self.spec()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Stable across processes, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
