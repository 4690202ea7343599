//! Indexes: named, immutable bundles of spaces and filterable fields.
//!
//! An [`Index`] is built once through [`IndexBuilder`] and never mutated.
//! Adding a space means building a new index and re-populating it, so an
//! index never holds vectors of mixed dimensionality. Spaces are shared
//! through `Arc`, letting a document-level and a chunk-level index reuse
//! the same encoder configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkingConfig;
use crate::error::{Error, Result};
use crate::models::{Entity, EntityType};
use crate::space::{Space, SpaceKind};

/// Per-space vectors of one entity, plus the model that produced each
/// model-backed vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityVectors {
    pub vectors: BTreeMap<String, Vec<f32>>,
    pub models: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    spaces: Vec<Arc<Space>>,
    filterable_fields: BTreeSet<String>,
    entity_types: BTreeSet<EntityType>,
    chunking: Option<ChunkingConfig>,
}

impl Index {
    pub fn builder(name: impl Into<String>) -> IndexBuilder {
        IndexBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spaces(&self) -> &[Arc<Space>] {
        &self.spaces
    }

    pub fn space(&self, name: &str) -> Option<&Arc<Space>> {
        self.spaces.iter().find(|s| s.name() == name)
    }

    /// First space of the given kind, in declaration order.
    pub fn first_of_kind(&self, kind: SpaceKind) -> Option<&Arc<Space>> {
        self.spaces.iter().find(|s| s.kind() == kind)
    }

    pub fn filterable_fields(&self) -> &BTreeSet<String> {
        &self.filterable_fields
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.filterable_fields.contains(field)
    }

    pub fn entity_types(&self) -> &BTreeSet<EntityType> {
        &self.entity_types
    }

    pub fn serves(&self, entity_type: EntityType) -> bool {
        self.entity_types.contains(&entity_type)
    }

    /// Chunking granularity for chunk-level indexes.
    pub fn chunking(&self) -> Option<&ChunkingConfig> {
        self.chunking.as_ref()
    }

    /// Encode `entity` into every space of this index.
    pub fn encode(&self, entity: &Entity) -> Result<EntityVectors> {
        if !self.serves(entity.entity_type()) {
            return Err(Error::IndexConfig(format!(
                "index '{}' does not serve {} entities",
                self.name,
                entity.entity_type()
            )));
        }
        let mut out = EntityVectors::default();
        for space in &self.spaces {
            let vector = space.embed_entity(entity)?;
            if let Some(model) = space.model_id() {
                out.models.insert(space.name().to_string(), model.to_string());
            }
            out.vectors.insert(space.name().to_string(), vector);
        }
        Ok(out)
    }
}

/// Collects the parts of an [`Index`] and validates them in [`build`](IndexBuilder::build).
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    name: String,
    spaces: Vec<Arc<Space>>,
    filterable_fields: BTreeSet<String>,
    entity_types: BTreeSet<EntityType>,
    chunking: Option<ChunkingConfig>,
}

impl IndexBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spaces: Vec::new(),
            filterable_fields: BTreeSet::new(),
            entity_types: BTreeSet::new(),
            chunking: None,
        }
    }

    pub fn space(mut self, space: Arc<Space>) -> Self {
        self.spaces.push(space);
        self
    }

    pub fn filterable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_types.insert(entity_type);
        self
    }

    pub fn chunking(mut self, config: ChunkingConfig) -> Self {
        self.chunking = Some(config);
        self
    }

    pub fn build(self) -> Result<Index> {
        let name = self.name;
        if name.trim().is_empty() {
            return Err(Error::IndexConfig("index name must not be empty".to_string()));
        }
        if self.spaces.is_empty() {
            return Err(Error::IndexConfig(format!(
                "index '{}' must contain at least one space",
                name
            )));
        }
        if self.entity_types.is_empty() {
            return Err(Error::IndexConfig(format!(
                "index '{}' must declare at least one entity type",
                name
            )));
        }

        let mut seen = BTreeSet::new();
        for space in &self.spaces {
            if !seen.insert(space.name()) {
                return Err(Error::IndexConfig(format!(
                    "index '{}' declares space '{}' twice",
                    name,
                    space.name()
                )));
            }
            let kinds: Vec<_> = self
                .entity_types
                .iter()
                .filter_map(|t| t.field_kind(space.field()))
                .collect();
            if kinds.is_empty() {
                return Err(Error::IndexConfig(format!(
                    "space '{}' is backed by field '{}', which none of the entity types of index '{}' has",
                    space.name(),
                    space.field(),
                    name
                )));
            }
            if let Some(kind) = kinds.iter().find(|k| !space.accepts(**k)) {
                return Err(Error::IndexConfig(format!(
                    "space '{}' ({}) cannot be backed by field '{}' of shape {:?}",
                    space.name(),
                    space.kind(),
                    space.field(),
                    kind
                )));
            }
        }

        for field in &self.filterable_fields {
            if !self.entity_types.iter().any(|t| t.has_field(field)) {
                return Err(Error::IndexConfig(format!(
                    "filterable field '{}' does not exist on the entity types of index '{}'",
                    field, name
                )));
            }
        }

        if self.chunking.is_some() && !self.entity_types.contains(&EntityType::Chunk) {
            return Err(Error::IndexConfig(format!(
                "index '{}' has a chunking config but does not serve chunks",
                name
            )));
        }

        tracing::debug!(
            index = %name,
            spaces = self.spaces.len(),
            filterable = self.filterable_fields.len(),
            "built index"
        );

        Ok(Index {
            name,
            spaces: self.spaces,
            filterable_fields: self.filterable_fields,
            entity_types: self.entity_types,
            chunking: self.chunking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEncoder;
    use crate::space::{NumberMode, NumberSpace, TextSpace};

    fn content_space() -> Arc<Space> {
        let encoder = Arc::new(HashingEncoder::new(16).unwrap());
        Arc::new(TextSpace::new("content", "content", encoder).into())
    }

    fn authority_space() -> Arc<Space> {
        Arc::new(
            NumberSpace::new("authority", "authority_score", 0.0, 1.0, NumberMode::Maximum)
                .unwrap()
                .into(),
        )
    }

    #[test]
    fn test_build_valid_index() {
        let index = Index::builder("documents")
            .space(content_space())
            .space(authority_space())
            .filterable(["jurisdiction", "document_type"])
            .entity_type(EntityType::Document)
            .build()
            .unwrap();
        assert_eq!(index.name(), "documents");
        assert_eq!(index.spaces().len(), 2);
        assert!(index.is_filterable("jurisdiction"));
        assert!(index.space("authority").is_some());
        assert_eq!(
            index.first_of_kind(SpaceKind::Text).map(|s| s.name()),
            Some("content")
        );
    }

    #[test]
    fn test_zero_spaces_rejected() {
        let err = Index::builder("empty")
            .entity_type(EntityType::Document)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::IndexConfig(_)));
    }

    #[test]
    fn test_duplicate_space_rejected() {
        let err = Index::builder("dup")
            .space(content_space())
            .space(content_space())
            .entity_type(EntityType::Document)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_space_field_must_exist() {
        let encoder = Arc::new(HashingEncoder::new(16).unwrap());
        let topics: Arc<Space> = Arc::new(TextSpace::new("topics", "topics", encoder).into());
        let err = Index::builder("chunks")
            .space(topics)
            .entity_type(EntityType::Chunk)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("topics"));
    }

    #[test]
    fn test_space_field_shape_checked() {
        let wrong: Arc<Space> = Arc::new(
            NumberSpace::new("authority", "jurisdiction", 0.0, 1.0, NumberMode::Maximum)
                .unwrap()
                .into(),
        );
        let err = Index::builder("documents")
            .space(wrong)
            .entity_type(EntityType::Document)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::IndexConfig(_)));
    }

    #[test]
    fn test_filterable_field_must_exist() {
        let err = Index::builder("documents")
            .space(content_space())
            .filterable(["court_level"])
            .entity_type(EntityType::Document)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("court_level"));
    }

    #[test]
    fn test_chunking_requires_chunk_entities() {
        let err = Index::builder("documents")
            .space(content_space())
            .entity_type(EntityType::Document)
            .chunking(ChunkingConfig::new(100, 10).unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::IndexConfig(_)));
    }
}
