//! Kind -> decoder lookup for every stage contract.

use std::collections::HashMap;

use crate::errors::{SerializationError, StageRole};
use crate::extract::{Extractor, RowsExtractor};
use crate::load::{Loader, OutputLoader};
use crate::partition::{ByEntries, HashBuckets, Partitioner, SinglePartition};
use crate::stage::{ConfigStage, StageSpec};
use crate::transform::{
    DropEntries, Filter, Limit, Rename, Select, SortBy, StructureUnpack, Transformer, WithEntry,
};

pub type ExtractorDecoder = fn(&StageSpec) -> Result<Box<dyn Extractor>, SerializationError>;
pub type TransformerDecoder = fn(&StageSpec) -> Result<Box<dyn Transformer>, SerializationError>;
pub type LoaderDecoder = fn(&StageSpec) -> Result<Box<dyn Loader>, SerializationError>;
pub type PartitionerDecoder = fn(&StageSpec) -> Result<Box<dyn Partitioner>, SerializationError>;

/// Decoders for stage specs, keyed by role and kind.
///
/// An explicit value passed to [`crate::PipelineDefinition::build`]; there
/// is no process-wide registry. Adapter crates add their kinds with the
/// `register_*` methods.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    extractors: HashMap<String, ExtractorDecoder>,
    transformers: HashMap<String, TransformerDecoder>,
    loaders: HashMap<String, LoaderDecoder>,
    partitioners: HashMap<String, PartitionerDecoder>,
}

impl StageRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_extractor(RowsExtractor::KIND, decode_extractor::<RowsExtractor>)
            .register_loader(OutputLoader::KIND, OutputLoader::decode)
            .register_transformer(WithEntry::KIND, decode_transformer::<WithEntry>)
            .register_transformer(Filter::KIND, decode_transformer::<Filter>)
            .register_transformer(DropEntries::KIND, decode_transformer::<DropEntries>)
            .register_transformer(Select::KIND, decode_transformer::<Select>)
            .register_transformer(Rename::KIND, decode_transformer::<Rename>)
            .register_transformer(SortBy::KIND, decode_transformer::<SortBy>)
            .register_transformer(StructureUnpack::KIND, decode_transformer::<StructureUnpack>)
            .register_transformer(Limit::KIND, decode_transformer::<Limit>)
            .register_partitioner(SinglePartition::KIND, decode_partitioner::<SinglePartition>)
            .register_partitioner(ByEntries::KIND, decode_partitioner::<ByEntries>)
            .register_partitioner(HashBuckets::KIND, decode_partitioner::<HashBuckets>);
        registry
    }

    pub fn register_extractor(&mut self, kind: &str, decoder: ExtractorDecoder) -> &mut Self {
        self.extractors.insert(kind.to_string(), decoder);
        self
    }

    pub fn register_transformer(&mut self, kind: &str, decoder: TransformerDecoder) -> &mut Self {
        self.transformers.insert(kind.to_string(), decoder);
        self
    }

    pub fn register_loader(&mut self, kind: &str, decoder: LoaderDecoder) -> &mut Self {
        self.loaders.insert(kind.to_string(), decoder);
        self
    }

    pub fn register_partitioner(&mut self, kind: &str, decoder: PartitionerDecoder) -> &mut Self {
        self.partitioners.insert(kind.to_string(), decoder);
        self
    }

    /// # Errors
    ///
    /// Returns [`SerializationError::UnknownKind`] for an unregistered kind,
    /// or the decoder's error for a malformed config.
    pub fn extractor(&self, spec: &StageSpec) -> Result<Box<dyn Extractor>, SerializationError> {
        lookup(&self.extractors, StageRole::Extractor, spec)?(spec)
    }

    /// # Errors
    ///
    /// See [`StageRegistry::extractor`].
    pub fn transformer(
        &self,
        spec: &StageSpec,
    ) -> Result<Box<dyn Transformer>, SerializationError> {
        lookup(&self.transformers, StageRole::Transformer, spec)?(spec)
    }

    /// # Errors
    ///
    /// See [`StageRegistry::extractor`].
    pub fn loader(&self, spec: &StageSpec) -> Result<Box<dyn Loader>, SerializationError> {
        lookup(&self.loaders, StageRole::Loader, spec)?(spec)
    }

    /// # Errors
    ///
    /// See [`StageRegistry::extractor`].
    pub fn partitioner(
        &self,
        spec: &StageSpec,
    ) -> Result<Box<dyn Partitioner>, SerializationError> {
        lookup(&self.partitioners, StageRole::Partitioner, spec)?(spec)
    }

    #[must_use]
    pub fn contains(&self, role: StageRole, kind: &str) -> bool {
        match role {
            StageRole::Extractor => self.extractors.contains_key(kind),
            StageRole::Transformer => self.transformers.contains_key(kind),
            StageRole::Loader => self.loaders.contains_key(kind),
            StageRole::Partitioner => self.partitioners.contains_key(kind),
        }
    }

    /// Registered kinds for `role`, sorted.
    #[must_use]
    pub fn kinds(&self, role: StageRole) -> Vec<&str> {
        let mut kinds: Vec<&str> = match role {
            StageRole::Extractor => self.extractors.keys().map(String::as_str).collect(),
            StageRole::Transformer => self.transformers.keys().map(String::as_str).collect(),
            StageRole::Loader => self.loaders.keys().map(String::as_str).collect(),
            StageRole::Partitioner => self.partitioners.keys().map(String::as_str).collect(),
        };
        kinds.sort_unstable();
        kinds
    }
}

fn lookup<D: Copy>(
    decoders: &HashMap<String, D>,
    role: StageRole,
    spec: &StageSpec,
) -> Result<D, SerializationError> {
    decoders
        .get(&spec.kind)
        .copied()
        .ok_or_else(|| SerializationError::UnknownKind {
            role,
            kind: spec.kind.clone(),
        })
}

/// Decoder for an extractor whose config is its serde form.
///
/// # Errors
///
/// Returns [`SerializationError::InvalidConfig`] on a malformed config.
pub fn decode_extractor<T>(spec: &StageSpec) -> Result<Box<dyn Extractor>, SerializationError>
where
    T: ConfigStage + Extractor + 'static,
{
    Ok(Box::new(spec.decode::<T>()?))
}

/// # Errors
///
/// Returns [`SerializationError::InvalidConfig`] on a malformed config.
pub fn decode_transformer<T>(spec: &StageSpec) -> Result<Box<dyn Transformer>, SerializationError>
where
    T: ConfigStage + Transformer + 'static,
{
    Ok(Box::new(spec.decode::<T>()?))
}

/// # Errors
///
/// Returns [`SerializationError::InvalidConfig`] on a malformed config.
pub fn decode_loader<T>(spec: &StageSpec) -> Result<Box<dyn Loader>, SerializationError>
where
    T: ConfigStage + Loader + 'static,
{
    Ok(Box::new(spec.decode::<T>()?))
}

/// # Errors
///
/// Returns [`SerializationError::InvalidConfig`] on a malformed config.
pub fn decode_partitioner<T>(spec: &StageSpec) -> Result<Box<dyn Partitioner>, SerializationError>
where
    T: ConfigStage + Partitioner + 'static,
{
    Ok(Box::new(spec.decode::<T>()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageConfig;

    #[test]
    fn builtins_cover_every_role() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(registry.kinds(StageRole::Extractor), vec!["rows"]);
        assert_eq!(registry.kinds(StageRole::Loader), vec!["output"]);
        assert_eq!(
            registry.kinds(StageRole::Transformer),
            vec![
                "drop",
                "filter",
                "limit",
                "rename",
                "select",
                "sort_by",
                "structure_unpack",
                "with_entry"
            ]
        );
        assert_eq!(
            registry.kinds(StageRole::Partitioner),
            vec!["by_entries", "hash_buckets", "single"]
        );
    }

    #[test]
    fn unknown_kind_names_role() {
        let registry = StageRegistry::with_builtins();
        let err = registry
            .loader(&StageSpec::new("parquet", StageConfig::new()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unknown loader kind 'parquet'");
    }

    #[test]
    fn empty_registry_knows_nothing() {
        let registry = StageRegistry::new();
        assert!(!registry.contains(StageRole::Transformer, "filter"));
        assert!(registry
            .transformer(&StageSpec::new("filter", StageConfig::new()))
            .is_err());
    }
}
