//! Staged, all-or-nothing ingestion into a document index and a chunk index.
//!
//! Ingestion is split in two so the expensive part can run on a worker
//! pool:
//!
//! 1. [`Catalog::stage`] is pure and CPU-bound. It composes the record,
//!    chunks it and encodes every entity into every space of its index.
//!    Nothing touches the store.
//! 2. [`Catalog::commit`] writes the staged batch. The chunk batch is
//!    replaced in one store call; the document follows. If the document
//!    write fails the previous chunk batch is restored, so readers keep
//!    seeing the previously committed version of the document.
//!
//! Re-ingesting an id is a full replace: chunks left over from an older
//! chunking of the same document never survive.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::compose::EntityComposer;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::models::{Entity, EntityType, SourceRecord};
use crate::query::Tier;
use crate::space::SpaceKind;
use crate::store::{StoredEntity, VectorStore};

/// The document-level and chunk-level index pair a corpus is ingested into.
#[derive(Debug, Clone)]
pub struct Catalog {
    documents: Index,
    chunks: Index,
    composer: EntityComposer,
}

/// A composed and encoded document, ready to commit.
#[derive(Debug, Clone)]
pub struct StagedDocument {
    pub document_id: String,
    pub document: StoredEntity,
    pub chunks: Vec<StoredEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub document_id: String,
    pub chunks_written: usize,
    /// Size of the chunk batch this commit replaced.
    pub chunks_replaced: usize,
}

impl Catalog {
    pub fn new(documents: Index, chunks: Index) -> Result<Self> {
        if documents.name() == chunks.name() {
            return Err(Error::IndexConfig(format!(
                "document and chunk indexes must have distinct names, both are '{}'",
                documents.name()
            )));
        }
        if !documents.serves(EntityType::Document) {
            return Err(Error::IndexConfig(format!(
                "index '{}' must serve document entities",
                documents.name()
            )));
        }
        if !chunks.serves(EntityType::Chunk) {
            return Err(Error::IndexConfig(format!(
                "index '{}' must serve chunk entities",
                chunks.name()
            )));
        }
        let chunking = chunks.chunking().cloned().ok_or_else(|| {
            Error::IndexConfig(format!(
                "chunk index '{}' has no chunking config",
                chunks.name()
            ))
        })?;
        Ok(Self {
            documents,
            chunks,
            composer: EntityComposer::new(chunking),
        })
    }

    pub fn documents(&self) -> &Index {
        &self.documents
    }

    pub fn chunks(&self) -> &Index {
        &self.chunks
    }

    pub fn composer(&self) -> &EntityComposer {
        &self.composer
    }

    /// Index queried by `tier`.
    pub fn index_for(&self, tier: Tier) -> &Index {
        match tier.entity_type() {
            EntityType::Document => &self.documents,
            EntityType::Chunk => &self.chunks,
        }
    }

    /// Compose and encode `record` without touching any store.
    pub fn stage(&self, record: &SourceRecord) -> Result<StagedDocument> {
        let (document, chunks) = self.composer.compose(record)?;
        let document_id = document.id.clone();

        let document = encode(&self.documents, Entity::Document(document))?;
        let chunks = chunks
            .into_iter()
            .map(|chunk| encode(&self.chunks, Entity::Chunk(chunk)))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(document_id = %document_id, chunks = chunks.len(), "staged document");
        Ok(StagedDocument {
            document_id,
            document,
            chunks,
        })
    }

    /// Write a staged document, replacing any previous version.
    ///
    /// Fails with [`Error::PartialIngestion`] if either write fails; the
    /// previously committed version stays visible in that case.
    pub async fn commit<S: VectorStore + ?Sized>(
        &self,
        store: &S,
        staged: StagedDocument,
    ) -> Result<CommitReport> {
        let StagedDocument {
            document_id,
            document,
            chunks,
        } = staged;
        let chunks_written = chunks.len();

        let previous = store
            .entities_for_document(self.chunks.name(), &document_id)
            .await?;
        let chunks_replaced = previous.len();

        store
            .replace_document(self.chunks.name(), &document_id, chunks)
            .await
            .map_err(|err| partial(&document_id, format!("chunk batch not written: {}", err)))?;

        if let Err(err) = store
            .replace_document(self.documents.name(), &document_id, vec![document])
            .await
        {
            tracing::warn!(
                document_id = %document_id,
                error = %err,
                "document write failed, restoring previous chunk batch"
            );
            let reason = match store
                .replace_document(self.chunks.name(), &document_id, previous)
                .await
            {
                Ok(()) => format!("document not written, chunk batch rolled back: {}", err),
                Err(rollback) => {
                    tracing::error!(
                        document_id = %document_id,
                        error = %rollback,
                        "chunk batch rollback failed"
                    );
                    format!(
                        "document not written ({}) and chunk rollback failed ({})",
                        err, rollback
                    )
                }
            };
            return Err(partial(&document_id, reason));
        }

        tracing::debug!(
            document_id = %document_id,
            chunks_written,
            chunks_replaced,
            "committed document"
        );
        Ok(CommitReport {
            document_id,
            chunks_written,
            chunks_replaced,
        })
    }

    /// Stage and commit in one call.
    pub async fn ingest<S: VectorStore + ?Sized>(
        &self,
        store: &S,
        record: &SourceRecord,
    ) -> Result<CommitReport> {
        let staged = self.stage(record)?;
        self.commit(store, staged).await
    }

    /// Remove a document and every chunk derived from it. Returns the
    /// number of entities removed.
    pub async fn remove<S: VectorStore + ?Sized>(&self, store: &S, document_id: &str) -> Result<usize> {
        let documents = store.delete_document(self.documents.name(), document_id).await?;
        let chunks = store.delete_document(self.chunks.name(), document_id).await?;
        tracing::info!(document_id, documents, chunks, "removed document");
        Ok(documents + chunks)
    }

    /// Re-encode every entity whose text vectors were produced by a model
    /// other than the one currently configured. Returns the number of
    /// documents re-embedded.
    pub async fn reembed_stale<S: VectorStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let mut refreshed = 0;
        for index in [&self.documents, &self.chunks] {
            let mut stale_documents = BTreeSet::new();
            for space in index.spaces().iter().filter(|s| s.kind() == SpaceKind::Text) {
                let Some(model_id) = space.model_id() else {
                    continue;
                };
                for id in store.stale_entities(index.name(), space.name(), model_id).await? {
                    if let Some(stored) = store.get(index.name(), &id).await? {
                        stale_documents.insert(stored.document_id().to_string());
                    }
                }
            }

            for document_id in stale_documents {
                let entities = store.entities_for_document(index.name(), &document_id).await?;
                let reencoded = entities
                    .into_iter()
                    .map(|stored| encode(index, stored.entity))
                    .collect::<Result<Vec<_>>>()?;
                store
                    .replace_document(index.name(), &document_id, reencoded)
                    .await?;
                refreshed += 1;
            }
        }
        if refreshed > 0 {
            tracing::info!(refreshed, "re-embedded stale entities");
        }
        Ok(refreshed)
    }
}

fn encode(index: &Index, entity: Entity) -> Result<StoredEntity> {
    let vectors = index.encode(&entity)?;
    Ok(StoredEntity { entity, vectors })
}

fn partial(document_id: &str, reason: String) -> Error {
    Error::PartialIngestion {
        document_id: document_id.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkingConfig;
    use crate::embedding::HashingEncoder;
    use crate::space::{Space, TextSpace};
    use crate::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn catalog(dims: usize, chunk_size: usize) -> Catalog {
        let encoder = Arc::new(HashingEncoder::new(dims).unwrap());
        let content: Arc<Space> = Arc::new(TextSpace::new("content", "content", encoder).into());
        let documents = Index::builder("documents")
            .space(content.clone())
            .entity_type(EntityType::Document)
            .build()
            .unwrap();
        let chunks = Index::builder("chunks")
            .space(content)
            .entity_type(EntityType::Chunk)
            .chunking(ChunkingConfig::new(chunk_size, chunk_size / 10).unwrap())
            .build()
            .unwrap();
        Catalog::new(documents, chunks).unwrap()
    }

    fn record(id: &str, content: &str) -> SourceRecord {
        SourceRecord {
            id: Some(id.into()),
            title: Some(id.into()),
            content: Some(content.into()),
            jurisdiction: Some("federal".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_document_and_chunks() {
        let catalog = catalog(16, 100);
        let store = InMemoryStore::new();
        let report = catalog.ingest(&store, &record("d1", &"word ".repeat(60))).await.unwrap();
        assert_eq!(report.chunks_written, 4);
        assert_eq!(report.chunks_replaced, 0);
        assert_eq!(store.len("documents").await.unwrap(), 1);
        assert_eq!(store.len("chunks").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let store = InMemoryStore::new();
        catalog(16, 100)
            .ingest(&store, &record("d1", &"word ".repeat(60)))
            .await
            .unwrap();
        let report = catalog(16, 400)
            .ingest(&store, &record("d1", &"word ".repeat(60)))
            .await
            .unwrap();
        assert_eq!(report.chunks_replaced, 4);
        assert_eq!(store.len("chunks").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_prunes_chunks() {
        let catalog = catalog(16, 100);
        let store = InMemoryStore::new();
        catalog.ingest(&store, &record("d1", &"word ".repeat(60))).await.unwrap();
        catalog.ingest(&store, &record("d2", "short")).await.unwrap();
        assert_eq!(catalog.remove(&store, "d1").await.unwrap(), 5);
        assert_eq!(store.len("chunks").await.unwrap(), 1);
        assert!(store.get("documents", "d2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reembed_after_model_change() {
        let store = InMemoryStore::new();
        catalog(16, 100).ingest(&store, &record("d1", "hello world")).await.unwrap();
        let upgraded = catalog(32, 100);
        assert_eq!(upgraded.reembed_stale(&store).await.unwrap(), 2);
        let doc = store.get("documents", "d1").await.unwrap().unwrap();
        assert_eq!(doc.vectors.vectors["content"].len(), 32);
        assert_eq!(doc.vectors.models["content"], "lexspace-hashing-v1/32");
        assert_eq!(upgraded.reembed_stale(&store).await.unwrap(), 0);
    }

    #[test]
    fn test_stage_validates_record() {
        let mut rec = record("d1", "text");
        rec.jurisdiction = None;
        assert!(matches!(
            catalog(16, 100).stage(&rec),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_catalog_requires_chunking() {
        let encoder = Arc::new(HashingEncoder::new(8).unwrap());
        let content: Arc<Space> = Arc::new(TextSpace::new("content", "content", encoder).into());
        let documents = Index::builder("documents")
            .space(content.clone())
            .entity_type(EntityType::Document)
            .build()
            .unwrap();
        let chunks = Index::builder("chunks")
            .space(content)
            .entity_type(EntityType::Chunk)
            .build()
            .unwrap();
        assert!(matches!(
            Catalog::new(documents, chunks),
            Err(Error::IndexConfig(_))
        ));
    }
}
