//! Result ranking over a [`VectorStore`].
//!
//! The [`Ranker`] executes a [`QueryDescriptor`] against one [`Index`]. It
//! is configured with the candidate pool factor and the tie-break keys;
//! the caller composes the query and passes the store implementation.
//!
//! # Ranking algorithm
//!
//! 1. Check the descriptor against the index: every clause space and
//!    every filter field must exist, or the query fails before any store
//!    round-trip.
//! 2. Build one query vector per clause.
//! 3. Ask the store for `max(limit × pool_factor, limit)` candidates with
//!    the filters pushed down, so filtering happens before the pool cut.
//! 4. Composite score `= Σ weightᵢ × similarityᵢ` over the clauses.
//! 5. Sort by composite (desc), then the configured tie-break keys
//!    (default authority score desc, citation count desc), then id (asc).
//! 6. Truncate to `limit`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::models::{Entity, Provenance};
use crate::query::QueryDescriptor;
use crate::store::{rank_order, StoreClause, StoreQuery, TieBreak, VectorStore, DEFAULT_TIE_BREAK};

/// Candidate pool multiplier used when none is configured.
pub const DEFAULT_POOL_FACTOR: usize = 4;

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub entity: Entity,
    /// Weighted composite score.
    pub score: f64,
    /// Unweighted similarity per participating space.
    pub per_space: BTreeMap<String, f64>,
    /// Citation trace; present exactly for chunk results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// Executes composed queries.
///
/// Equal composite scores are ordered by the configured [`TieBreak`] keys
/// (default [`DEFAULT_TIE_BREAK`]), then by id. The same order cuts the
/// store's candidate pool.
#[derive(Debug, Clone)]
pub struct Ranker {
    pool_factor: usize,
    tie_break: Vec<TieBreak>,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_FACTOR)
    }
}

impl Ranker {
    pub fn new(pool_factor: usize) -> Self {
        Self {
            pool_factor: pool_factor.max(1),
            tie_break: DEFAULT_TIE_BREAK.to_vec(),
        }
    }

    /// Replace the keys that order equal composite scores.
    pub fn with_tie_break(mut self, tie_break: Vec<TieBreak>) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn tie_break(&self) -> &[TieBreak] {
        &self.tie_break
    }

    pub fn pool_size(&self, limit: usize) -> usize {
        limit.saturating_mul(self.pool_factor).max(limit)
    }

    pub async fn execute<S: VectorStore + ?Sized>(
        &self,
        store: &S,
        index: &Index,
        query: &QueryDescriptor,
    ) -> Result<Vec<RankedResult>> {
        let store_query = self.plan(index, query)?;

        let candidates = store.search(index.name(), &store_query).await?;
        let pool = candidates.len();

        // Same summation order as the store, so scores and pool order agree.
        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .map(|candidate| {
                let score = store_query.clauses.iter().fold(0.0, |acc, clause| {
                    acc + clause.weight
                        * candidate.per_space.get(&clause.space).copied().unwrap_or(0.0)
                });
                RankedResult {
                    provenance: candidate.entity.provenance(),
                    entity: candidate.entity,
                    score,
                    per_space: candidate.per_space,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            rank_order(&self.tie_break, (a.score, &a.entity), (b.score, &b.entity))
        });
        results.truncate(query.limit);

        tracing::info!(
            index = %index.name(),
            tier = %query.tier,
            pool,
            returned = results.len(),
            "ranked query"
        );

        Ok(results)
    }

    /// Validate `query` against `index` and translate it into a store query.
    fn plan(&self, index: &Index, query: &QueryDescriptor) -> Result<StoreQuery> {
        if query.index != index.name() {
            return Err(Error::QueryComposition(format!(
                "query was composed for index '{}' but executed against '{}'",
                query.index,
                index.name()
            )));
        }
        if !index.serves(query.entity_type) {
            return Err(Error::QueryComposition(format!(
                "index '{}' does not serve {} entities",
                index.name(),
                query.entity_type
            )));
        }
        if query.limit == 0 {
            return Err(Error::QueryComposition("limit must be at least 1".to_string()));
        }

        let mut clauses = Vec::with_capacity(query.clauses.len());
        for clause in &query.clauses {
            let space = index.space(&clause.space).ok_or_else(|| {
                Error::QueryComposition(format!(
                    "index '{}' has no space '{}' required by the query",
                    index.name(),
                    clause.space
                ))
            })?;
            if !clause.weight.is_finite() || clause.weight < 0.0 {
                return Err(Error::QueryComposition(format!(
                    "weight for '{}' must be a finite non-negative number, got {}",
                    clause.space, clause.weight
                )));
            }
            if clause.weight == 0.0 {
                continue;
            }
            clauses.push(StoreClause {
                space: clause.space.clone(),
                weight: clause.weight,
                similarity: space.similarity(),
                vector: space.query_vector(&clause.target)?,
            });
        }

        if let Some(filter) = query.filters.iter().find(|f| !index.is_filterable(&f.field)) {
            return Err(Error::QueryComposition(format!(
                "field '{}' is not filterable on index '{}'",
                filter.field,
                index.name()
            )));
        }

        Ok(StoreQuery {
            entity_type: query.entity_type,
            clauses,
            filters: query.filters.clone(),
            pool_size: self.pool_size(query.limit),
            tie_break: self.tie_break.clone(),
        })
    }
}
