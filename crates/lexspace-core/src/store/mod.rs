//! Vector store abstraction for Lexspace.
//!
//! The [`VectorStore`] trait is the boundary to the external vector
//! database: entities keyed by id within a named index, one subvector per
//! space, scalar fields for predicate pushdown and atomic per-document
//! batch replace. Approximate nearest-neighbour mechanics, sharding and
//! persistence live behind it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must report every backend failure or timeout as
//! [`Error::StoreUnavailable`](crate::Error::StoreUnavailable), never as an
//! empty result.

pub mod memory;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::Filter;
use crate::index::EntityVectors;
use crate::models::{Entity, EntityType, FieldValue};
use crate::space::Similarity;

/// An entity together with its per-space vectors, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub entity: Entity,
    pub vectors: EntityVectors,
}

impl StoredEntity {
    pub fn id(&self) -> &str {
        self.entity.id()
    }

    pub fn document_id(&self) -> &str {
        self.entity.document_id()
    }
}

/// One weighted similarity term of a store query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreClause {
    pub space: String,
    pub weight: f64,
    pub similarity: Similarity,
    pub vector: Vec<f32>,
}

/// A pre-filtered, weighted multi-space top-k request.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub entity_type: EntityType,
    pub clauses: Vec<StoreClause>,
    /// Conjunctive predicates applied before scoring.
    pub filters: Vec<Filter>,
    /// Maximum number of candidates to return.
    pub pool_size: usize,
    /// Keys that order candidates with equal composite scores.
    pub tie_break: Vec<TieBreak>,
}

/// Entity field used to order results whose composite scores are equal.
///
/// Every key sorts descending. Entity id (ascending) settles whatever
/// the configured keys leave tied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    AuthorityScore,
    CitationCount,
    RecencyTimestamp,
}

/// Authority score, then citation count.
pub const DEFAULT_TIE_BREAK: &[TieBreak] = &[TieBreak::AuthorityScore, TieBreak::CitationCount];

impl TieBreak {
    fn key(&self, entity: &Entity) -> f64 {
        match self {
            TieBreak::AuthorityScore => entity.authority_score(),
            TieBreak::CitationCount => entity.citation_count() as f64,
            TieBreak::RecencyTimestamp => match entity.field("recency_timestamp") {
                Some(FieldValue::Number(ts)) => ts,
                _ => f64::MIN,
            },
        }
    }
}

/// Result order shared by stores and the ranker: composite score desc,
/// then each `tie_break` key desc, then id asc.
///
/// Stores must cut their candidate pool with this order so that a smaller
/// limit always returns a prefix of a larger one.
pub fn rank_order(tie_break: &[TieBreak], a: (f64, &Entity), b: (f64, &Entity)) -> Ordering {
    let (a_score, a) = a;
    let (b_score, b) = b;
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            tie_break
                .iter()
                .map(|key| {
                    key.key(b)
                        .partial_cmp(&key.key(a))
                        .unwrap_or(Ordering::Equal)
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id().cmp(b.id()))
}

/// An entity that passed the filters, with its per-space similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entity: Entity,
    pub per_space: BTreeMap<String, f64>,
}

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_document`](VectorStore::replace_document) | Atomically replace every entity of a document |
/// | [`entities_for_document`](VectorStore::entities_for_document) | Read back a document's entities |
/// | [`delete_document`](VectorStore::delete_document) | Remove every entity of a document |
/// | [`get`](VectorStore::get) | Fetch one entity by id |
/// | [`search`](VectorStore::search) | Filtered, weighted multi-space top-k |
/// | [`stale_entities`](VectorStore::stale_entities) | Ids whose vector in a space came from another model |
/// | [`len`](VectorStore::len) | Number of entities in an index |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace every entity owned by `document_id` in `index` with
    /// `entities`, in one step. Readers see either the old set or the new
    /// one, never a mix. An empty batch removes the document's entities.
    async fn replace_document(
        &self,
        index: &str,
        document_id: &str,
        entities: Vec<StoredEntity>,
    ) -> Result<()>;

    /// All entities owned by `document_id`, ordered by id.
    async fn entities_for_document(&self, index: &str, document_id: &str)
        -> Result<Vec<StoredEntity>>;

    /// Remove every entity owned by `document_id`. Returns how many went.
    async fn delete_document(&self, index: &str, document_id: &str) -> Result<usize>;

    async fn get(&self, index: &str, id: &str) -> Result<Option<StoredEntity>>;

    /// Apply `query.filters`, score the survivors and return at most
    /// `query.pool_size` candidates in [`rank_order`].
    async fn search(&self, index: &str, query: &StoreQuery) -> Result<Vec<Candidate>>;

    /// Ids of entities whose vector in `space` was produced by a model
    /// other than `model_id`.
    async fn stale_entities(&self, index: &str, space: &str, model_id: &str)
        -> Result<Vec<String>>;

    async fn len(&self, index: &str) -> Result<usize>;
}
