//! Tiered query composition.
//!
//! A [`QueryComposer`] turns a tier name plus caller parameters into a
//! [`QueryDescriptor`]: the target entity type, one weighted clause per
//! participating space, the hard filters and the result limit. Everything
//! is validated against the target [`Index`] here, before any store
//! round-trip.
//!
//! # Tiers
//!
//! | Tier | Entities | Clauses by default | Filters |
//! |------|----------|--------------------|---------|
//! | Discovery | documents | text only | at most one, exact/set |
//! | Exploration | documents | text, number, recency, categorical (if categories given) | conjunctive |
//! | Deep Dive | chunks | same as Exploration | conjunctive, optional |
//!
//! In every tier an explicit weight opts a space in, and supplying
//! categories or a number target for a space opts it in at its default
//! weight. A weight of `0` removes the clause entirely.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::Index;
use crate::models::EntityType;
use crate::space::{QueryTarget, Space, SpaceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Discovery,
    Exploration,
    DeepDive,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Discovery, Tier::Exploration, Tier::DeepDive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Discovery => "discovery",
            Tier::Exploration => "exploration",
            Tier::DeepDive => "deep_dive",
        }
    }

    /// Entity type the tier returns.
    pub fn entity_type(&self) -> EntityType {
        match self {
            Tier::Discovery | Tier::Exploration => EntityType::Document,
            Tier::DeepDive => EntityType::Chunk,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discovery" => Ok(Tier::Discovery),
            "exploration" => Ok(Tier::Exploration),
            "deep_dive" | "deep-dive" | "deepdive" => Ok(Tier::DeepDive),
            other => Err(Error::QueryComposition(format!(
                "unknown tier '{}': expected discovery, exploration or deep_dive",
                other
            ))),
        }
    }
}

fn default_text_weight() -> f64 {
    1.0
}

fn default_categorical_weight() -> f64 {
    1.0
}

fn default_number_weight() -> f64 {
    0.85
}

fn default_recency_weight() -> f64 {
    0.5
}

/// Weight a space gets when the caller does not supply one, by space kind.
///
/// Authority (number) defaults high so it is rarely drowned out; recency
/// defaults low so it only nudges the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultWeights {
    #[serde(default = "default_text_weight")]
    pub text: f64,
    #[serde(default = "default_categorical_weight")]
    pub categorical: f64,
    #[serde(default = "default_number_weight")]
    pub number: f64,
    #[serde(default = "default_recency_weight")]
    pub recency: f64,
}

impl Default for DefaultWeights {
    fn default() -> Self {
        Self {
            text: default_text_weight(),
            categorical: default_categorical_weight(),
            number: default_number_weight(),
            recency: default_recency_weight(),
        }
    }
}

impl DefaultWeights {
    pub fn for_kind(&self, kind: SpaceKind) -> f64 {
        match kind {
            SpaceKind::Text => self.text,
            SpaceKind::Categorical => self.categorical,
            SpaceKind::Number => self.number,
            SpaceKind::Recency => self.recency,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("text", self.text),
            ("categorical", self.categorical),
            ("number", self.number),
            ("recency", self.recency),
        ] {
            check_weight(name, w)?;
        }
        Ok(())
    }
}

/// Per-tier result limits and default weights.
#[derive(Debug, Clone, PartialEq)]
pub struct TierDefaults {
    pub discovery_limit: usize,
    pub exploration_limit: usize,
    pub deep_dive_limit: usize,
    pub weights: DefaultWeights,
}

impl Default for TierDefaults {
    fn default() -> Self {
        Self {
            discovery_limit: 50,
            exploration_limit: 20,
            deep_dive_limit: 10,
            weights: DefaultWeights::default(),
        }
    }
}

impl TierDefaults {
    pub fn limit(&self, tier: Tier) -> usize {
        match tier {
            Tier::Discovery => self.discovery_limit,
            Tier::Exploration => self.exploration_limit,
            Tier::DeepDive => self.deep_dive_limit,
        }
    }
}

/// Caller-supplied query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub search_text: String,
    /// Explicit per-space weights, keyed by space name.
    pub weights: BTreeMap<String, f64>,
    pub filters: Vec<Filter>,
    /// Requested categories per categorical space.
    pub categories: BTreeMap<String, Vec<String>>,
    /// Target values per number space.
    pub number_targets: BTreeMap<String, f64>,
    /// Overrides the tier's default limit.
    pub limit: Option<usize>,
}

impl QueryParams {
    pub fn new(search_text: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
            ..Default::default()
        }
    }

    pub fn weight(mut self, space: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(space.into(), weight);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn categories<I, S>(mut self, space: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .insert(space.into(), categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn target(mut self, space: impl Into<String>, value: f64) -> Self {
        self.number_targets.insert(space.into(), value);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One weighted space of a composed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceClause {
    pub space: String,
    pub weight: f64,
    pub target: QueryTarget,
}

/// A fully validated query, ready for the ranker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub index: String,
    pub tier: Tier,
    pub entity_type: EntityType,
    pub search_text: String,
    pub clauses: Vec<SpaceClause>,
    pub filters: Vec<Filter>,
    pub limit: usize,
}

impl QueryDescriptor {
    pub fn clause(&self, space: &str) -> Option<&SpaceClause> {
        self.clauses.iter().find(|c| c.space == space)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryComposer {
    defaults: TierDefaults,
}

impl QueryComposer {
    pub fn new(defaults: TierDefaults) -> Result<Self> {
        defaults.weights.validate()?;
        Ok(Self { defaults })
    }

    pub fn defaults(&self) -> &TierDefaults {
        &self.defaults
    }

    pub fn compose(&self, index: &Index, tier: Tier, params: QueryParams) -> Result<QueryDescriptor> {
        let search_text = params.search_text.trim();
        if search_text.is_empty() {
            return Err(Error::QueryComposition(
                "search text must not be empty".to_string(),
            ));
        }

        let entity_type = tier.entity_type();
        if !index.serves(entity_type) {
            return Err(Error::QueryComposition(format!(
                "tier {} needs {} entities, which index '{}' does not serve",
                tier,
                entity_type,
                index.name()
            )));
        }

        let primary_text = index.first_of_kind(SpaceKind::Text).ok_or_else(|| {
            Error::QueryComposition(format!("index '{}' has no text space", index.name()))
        })?;

        for (space, weight) in &params.weights {
            lookup_space(index, space)?;
            check_weight(space, *weight)?;
        }
        for space in params.categories.keys() {
            expect_kind(lookup_space(index, space)?, SpaceKind::Categorical)?;
        }
        for (space, target) in &params.number_targets {
            expect_kind(lookup_space(index, space)?, SpaceKind::Number)?;
            if !target.is_finite() {
                return Err(Error::QueryComposition(format!(
                    "target for space '{}' must be finite",
                    space
                )));
            }
        }

        let mut clauses = Vec::new();
        for space in index.spaces() {
            let name = space.name();
            let opted_in = params.categories.contains_key(name)
                || params.number_targets.contains_key(name);
            let by_default = space.name() == primary_text.name()
                || match (tier, space.kind()) {
                    (Tier::Discovery, _) => false,
                    (_, SpaceKind::Number | SpaceKind::Recency) => true,
                    _ => false,
                };

            let weight = match params.weights.get(name) {
                Some(w) => *w,
                None if opted_in || by_default => self.defaults.weights.for_kind(space.kind()),
                None => continue,
            };
            if weight == 0.0 {
                continue;
            }

            let target = match space.as_ref() {
                Space::Text(_) => QueryTarget::Text(search_text.to_string()),
                Space::Categorical(_) => match params.categories.get(name) {
                    Some(categories) => QueryTarget::Categories(categories.clone()),
                    None => {
                        return Err(Error::QueryComposition(format!(
                            "categorical space '{}' is weighted but no categories were given",
                            name
                        )))
                    }
                },
                Space::Number(s) => {
                    QueryTarget::Number(s.resolve_target(params.number_targets.get(name).copied()))
                }
                Space::Recency(_) => QueryTarget::Recent,
            };
            clauses.push(SpaceClause {
                space: name.to_string(),
                weight,
                target,
            });
        }
        if clauses.is_empty() {
            return Err(Error::QueryComposition(
                "every space of the query has weight 0".to_string(),
            ));
        }

        for filter in &params.filters {
            if !index.is_filterable(&filter.field) {
                return Err(Error::QueryComposition(format!(
                    "field '{}' is not filterable on index '{}'",
                    filter.field,
                    index.name()
                )));
            }
        }
        if tier == Tier::Discovery {
            if params.filters.len() > 1 {
                return Err(Error::QueryComposition(format!(
                    "discovery accepts at most one filter, got {}",
                    params.filters.len()
                )));
            }
            if params.filters.iter().any(|f| !f.is_categorical()) {
                return Err(Error::QueryComposition(
                    "discovery only accepts an exact or set-membership filter".to_string(),
                ));
            }
        }

        let limit = params.limit.unwrap_or_else(|| self.defaults.limit(tier));
        if limit == 0 {
            return Err(Error::QueryComposition("limit must be at least 1".to_string()));
        }

        tracing::debug!(
            index = %index.name(),
            tier = %tier,
            clauses = clauses.len(),
            filters = params.filters.len(),
            limit,
            "composed query"
        );

        Ok(QueryDescriptor {
            index: index.name().to_string(),
            tier,
            entity_type,
            search_text: search_text.to_string(),
            clauses,
            filters: params.filters,
            limit,
        })
    }
}

fn lookup_space<'a>(index: &'a Index, name: &str) -> Result<&'a Space> {
    index.space(name).map(|s| s.as_ref()).ok_or_else(|| {
        Error::QueryComposition(format!(
            "space '{}' is not part of index '{}'",
            name,
            index.name()
        ))
    })
}

fn expect_kind(space: &Space, kind: SpaceKind) -> Result<()> {
    if space.kind() != kind {
        return Err(Error::QueryComposition(format!(
            "space '{}' is a {} space, not {}",
            space.name(),
            space.kind(),
            kind
        )));
    }
    Ok(())
}

fn check_weight(space: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(Error::QueryComposition(format!(
            "weight for '{}' must be a finite non-negative number, got {}",
            space, weight
        )));
    }
    Ok(())
}
