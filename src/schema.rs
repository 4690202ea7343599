//! The legal retrieval schema: shared spaces plus the document-level and
//! chunk-level indexes built over them.
//!
//! | Space | Kind | Field |
//! |-------|------|-------|
//! | `content` | text | `content` (document body / chunk text) |
//! | `practice_area` | categorical | `practice_areas` |
//! | `document_type` | categorical | `document_type` |
//! | `authority` | number | `authority_score` |
//! | `recency` | recency | `recency_timestamp` |
//!
//! Both indexes hold the same `Arc`'d spaces, so a document and its chunks
//! are encoded with identical encoder configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use lexspace_core::embedding::TextEncoder;
use lexspace_core::index::Index;
use lexspace_core::ingest::Catalog;
use lexspace_core::models::{EntityType, EXTENSION_PREFIX};
use lexspace_core::space::{CategoricalSpace, NumberSpace, RecencySpace, Space, TextSpace};

use crate::config::Config;

pub const DOCUMENTS_INDEX: &str = "documents";
pub const CHUNKS_INDEX: &str = "chunks";

pub const CONTENT_SPACE: &str = "content";
pub const PRACTICE_AREA_SPACE: &str = "practice_area";
pub const DOCUMENT_TYPE_SPACE: &str = "document_type";
pub const AUTHORITY_SPACE: &str = "authority";
pub const RECENCY_SPACE: &str = "recency";

/// Filterable on both indexes.
const SHARED_FILTERS: &[&str] = &[
    "jurisdiction",
    "authority_level",
    "document_type",
    "practice_areas",
    "authority_score",
    "recency_timestamp",
    "citation_count",
];

/// Build the spaces and the two indexes described by `config`.
pub fn build_catalog(config: &Config, encoder: Arc<dyn TextEncoder>) -> Result<Catalog> {
    let spaces = build_spaces(config, encoder)?;

    let mut documents = Index::builder(DOCUMENTS_INDEX)
        .entity_type(EntityType::Document)
        .filterable(SHARED_FILTERS.iter().copied())
        .filterable(["topics"])
        .filterable(
            config
                .spaces
                .extension_filters
                .iter()
                .map(|key| format!("{}{}", EXTENSION_PREFIX, key)),
        );
    let mut chunks = Index::builder(CHUNKS_INDEX)
        .entity_type(EntityType::Chunk)
        .filterable(SHARED_FILTERS.iter().copied())
        .filterable(["parent_id"])
        .chunking(config.chunking.to_core()?);
    for space in spaces {
        documents = documents.space(space.clone());
        chunks = chunks.space(space);
    }

    let catalog = Catalog::new(documents.build()?, chunks.build()?)?;
    tracing::debug!(
        model = config.embedding.model.as_deref().unwrap_or(config.embedding.provider.as_str()),
        "built legal schema"
    );
    Ok(catalog)
}

fn build_spaces(config: &Config, encoder: Arc<dyn TextEncoder>) -> Result<Vec<Arc<Space>>> {
    let spaces = &config.spaces;
    let reference_time = spaces.recency.reference_timestamp()?;

    let content = TextSpace::new(CONTENT_SPACE, "content", encoder);
    let practice_area = CategoricalSpace::new(
        PRACTICE_AREA_SPACE,
        "practice_areas",
        spaces.practice_areas.iter().map(String::as_str),
        spaces.category_negative_filter,
        spaces.uncategorized_as_category,
    )
    .context("invalid practice area vocabulary")?;
    let document_type = CategoricalSpace::new(
        DOCUMENT_TYPE_SPACE,
        "document_type",
        spaces.document_types.iter().map(String::as_str),
        spaces.category_negative_filter,
        spaces.uncategorized_as_category,
    )
    .context("invalid document type vocabulary")?;
    let authority = NumberSpace::new(
        AUTHORITY_SPACE,
        "authority_score",
        spaces.authority.min,
        spaces.authority.max,
        spaces.authority.mode,
    )?;
    let recency = RecencySpace::new(
        RECENCY_SPACE,
        "recency_timestamp",
        reference_time,
        spaces.recency.core_periods()?,
        spaces.recency.negative_filter,
    )?;

    Ok(vec![
        Arc::new(content.into()),
        Arc::new(practice_area.into()),
        Arc::new(document_type.into()),
        Arc::new(authority.into()),
        Arc::new(recency.into()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexspace_core::embedding::HashingEncoder;
    use lexspace_core::query::Tier;

    #[test]
    fn test_default_schema() {
        let encoder = Arc::new(HashingEncoder::new(32).unwrap());
        let catalog = build_catalog(&Config::default(), encoder).unwrap();
        assert_eq!(catalog.documents().spaces().len(), 5);
        assert_eq!(catalog.chunks().spaces().len(), 5);
        assert!(catalog.documents().is_filterable("topics"));
        assert!(!catalog.chunks().is_filterable("topics"));
        assert!(catalog.chunks().is_filterable("parent_id"));
        assert_eq!(catalog.index_for(Tier::DeepDive).name(), CHUNKS_INDEX);
        assert_eq!(catalog.composer().chunking().chunk_size(), 2000);
    }

    #[test]
    fn test_extension_filters() {
        let mut config = Config::default();
        config.spaces.extension_filters = vec!["injury_type".into()];
        let encoder = Arc::new(HashingEncoder::new(8).unwrap());
        let catalog = build_catalog(&config, encoder).unwrap();
        assert!(catalog.documents().is_filterable("extensions.injury_type"));
    }
}
