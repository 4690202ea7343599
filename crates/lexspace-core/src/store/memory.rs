//! In-memory [`VectorStore`] implementation for tests and small corpora.
//!
//! Entities live in a `BTreeMap` per index behind a single
//! `std::sync::RwLock`, so a document replace is one write-locked step and
//! iteration order is deterministic. Search is brute force: filter, score
//! every survivor, sort.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{rank_order, Candidate, StoreQuery, StoredEntity, VectorStore};

type Indexes = HashMap<String, BTreeMap<String, StoredEntity>>;

pub struct InMemoryStore {
    indexes: RwLock<Indexes>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Indexes>> {
        self.indexes
            .read()
            .map_err(|_| Error::StoreUnavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Indexes>> {
        self.indexes
            .write()
            .map_err(|_| Error::StoreUnavailable("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn replace_document(
        &self,
        index: &str,
        document_id: &str,
        entities: Vec<StoredEntity>,
    ) -> Result<()> {
        if let Some(foreign) = entities.iter().find(|e| e.document_id() != document_id) {
            return Err(Error::PartialIngestion {
                document_id: document_id.to_string(),
                reason: format!(
                    "entity '{}' belongs to document '{}'",
                    foreign.id(),
                    foreign.document_id()
                ),
            });
        }
        let mut indexes = self.write()?;
        let stored = indexes.entry(index.to_string()).or_default();
        stored.retain(|_, e| e.document_id() != document_id);
        for entity in entities {
            stored.insert(entity.id().to_string(), entity);
        }
        Ok(())
    }

    async fn entities_for_document(
        &self,
        index: &str,
        document_id: &str,
    ) -> Result<Vec<StoredEntity>> {
        let indexes = self.read()?;
        Ok(indexes
            .get(index)
            .map(|stored| {
                stored
                    .values()
                    .filter(|e| e.document_id() == document_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_document(&self, index: &str, document_id: &str) -> Result<usize> {
        let mut indexes = self.write()?;
        let Some(stored) = indexes.get_mut(index) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|_, e| e.document_id() != document_id);
        Ok(before - stored.len())
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<StoredEntity>> {
        let indexes = self.read()?;
        Ok(indexes.get(index).and_then(|stored| stored.get(id)).cloned())
    }

    async fn search(&self, index: &str, query: &StoreQuery) -> Result<Vec<Candidate>> {
        let indexes = self.read()?;
        let Some(stored) = indexes.get(index) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f64, Candidate)> = stored
            .values()
            .filter(|e| e.entity.entity_type() == query.entity_type)
            .filter(|e| query.filters.iter().all(|f| f.matches(&e.entity)))
            .map(|e| {
                let mut composite = 0.0;
                let mut per_space = BTreeMap::new();
                for clause in &query.clauses {
                    let score = e
                        .vectors
                        .vectors
                        .get(&clause.space)
                        .map(|v| clause.similarity.score(&clause.vector, v))
                        .unwrap_or(0.0);
                    composite += clause.weight * score;
                    per_space.insert(clause.space.clone(), score);
                }
                (
                    composite,
                    Candidate {
                        entity: e.entity.clone(),
                        per_space,
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| rank_order(&query.tie_break, (a.0, &a.1.entity), (b.0, &b.1.entity)));
        scored.truncate(query.pool_size);
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }

    async fn stale_entities(&self, index: &str, space: &str, model_id: &str) -> Result<Vec<String>> {
        let indexes = self.read()?;
        Ok(indexes
            .get(index)
            .map(|stored| {
                stored
                    .values()
                    .filter(|e| {
                        e.vectors.vectors.contains_key(space)
                            && e.vectors.models.get(space).map(String::as_str) != Some(model_id)
                    })
                    .map(|e| e.id().to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn len(&self, index: &str) -> Result<usize> {
        let indexes = self.read()?;
        Ok(indexes.get(index).map(BTreeMap::len).unwrap_or(0))
    }
}
