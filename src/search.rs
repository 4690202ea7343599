//! Tiered search over an ingested corpus, rendered as JSON.
//!
//! A successful search always prints `{"tier", "index", "results": [...]}`,
//! with an empty `results` array when nothing matched. A failed search
//! prints `{"error": {"kind", "message", "retryable"}}` instead, so "no
//! matches" and "search failed" can never be confused.

use std::collections::BTreeMap;

use chrono::DateTime;
use lexspace_core::filter::Filter;
use lexspace_core::ingest::Catalog;
use lexspace_core::models::{Entity, Provenance};
use lexspace_core::query::{QueryComposer, QueryParams, Tier};
use lexspace_core::search::{RankedResult, Ranker};
use lexspace_core::store::VectorStore;
use serde::Serialize;

const SNIPPET_CHARS: usize = 240;

/// Search parameters as they arrive from the CLI.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub tier: Tier,
    pub query: String,
    pub filters: Vec<Filter>,
    pub weights: Vec<(String, f64)>,
    pub categories: Vec<(String, Vec<String>)>,
    pub targets: Vec<(String, f64)>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(tier: Tier, query: impl Into<String>) -> Self {
        Self {
            tier,
            query: query.into(),
            filters: Vec::new(),
            weights: Vec::new(),
            categories: Vec::new(),
            targets: Vec::new(),
            limit: None,
        }
    }

    fn into_params(self) -> QueryParams {
        QueryParams {
            search_text: self.query,
            weights: self.weights.into_iter().collect(),
            filters: self.filters,
            categories: self.categories.into_iter().collect(),
            number_targets: self.targets.into_iter().collect(),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub tier: Tier,
    pub index: String,
    pub results: Vec<SearchHit>,
}

/// One result, shaped for display.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub entity_type: String,
    pub score: f64,
    pub per_space: BTreeMap<String, f64>,
    pub title: Option<String>,
    pub jurisdiction: String,
    pub document_type: String,
    pub authority_level: String,
    /// Date of the recency timestamp (ISO 8601).
    pub date: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl From<RankedResult> for SearchHit {
    fn from(result: RankedResult) -> Self {
        let (title, jurisdiction, document_type, authority_level, timestamp, text) =
            match &result.entity {
                Entity::Document(d) => (
                    Some(d.title.clone()),
                    d.jurisdiction.clone(),
                    d.document_type.to_string(),
                    d.authority_level.to_string(),
                    d.recency_timestamp,
                    d.content.as_str(),
                ),
                Entity::Chunk(c) => (
                    None,
                    c.jurisdiction.clone(),
                    c.document_type.to_string(),
                    c.authority_level.to_string(),
                    c.recency_timestamp,
                    c.text.as_str(),
                ),
            };
        let snippet = text
            .chars()
            .take(SNIPPET_CHARS)
            .collect::<String>()
            .replace('\n', " ")
            .trim()
            .to_string();
        Self {
            id: result.entity.id().to_string(),
            entity_type: result.entity.entity_type().to_string(),
            score: result.score,
            per_space: result.per_space,
            title,
            jurisdiction,
            document_type,
            authority_level,
            date: format_date(timestamp),
            snippet,
            provenance: result.provenance,
        }
    }
}

/// Compose and execute one tiered query.
pub async fn run_search<S: VectorStore + ?Sized>(
    catalog: &Catalog,
    store: &S,
    composer: &QueryComposer,
    ranker: &Ranker,
    request: SearchRequest,
) -> lexspace_core::Result<SearchResponse> {
    let tier = request.tier;
    let index = catalog.index_for(tier);
    let query = composer.compose(index, tier, request.into_params())?;
    let results = ranker.execute(store, index, &query).await?;
    Ok(SearchResponse {
        tier,
        index: index.name().to_string(),
        results: results.into_iter().map(SearchHit::from).collect(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

impl ErrorPayload {
    /// Classify `err` by the engine error it wraps, if any.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let (kind, retryable) = match err.downcast_ref::<lexspace_core::Error>() {
            Some(core) => (core.kind().to_string(), core.is_retryable()),
            None => ("internal_error".to_string(), false),
        };
        Self {
            error: ErrorBody {
                kind,
                message: format!("{:#}", err),
                retryable,
            },
        }
    }
}

fn format_date(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Parse `key=value` where the value is a float.
pub fn parse_key_f64(s: &str) -> Result<(String, f64), String> {
    let (key, value) = split_key_val(s)?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid number in '{}'", s))?;
    Ok((key, value))
}

/// Parse `key=a,b,c` into a key and its list of values.
pub fn parse_key_list(s: &str) -> Result<(String, Vec<String>), String> {
    let (key, value) = split_key_val(s)?;
    let values: Vec<String> = value
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(format!("no values in '{}'", s));
    }
    Ok((key, values))
}

fn split_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
