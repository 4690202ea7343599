use anyhow::{bail, Context, Result};
use lexspace_core::models::DocumentType;
use lexspace_core::query::{DefaultWeights, TierDefaults};
use lexspace_core::search::Ranker;
use lexspace_core::store::{TieBreak, DEFAULT_TIE_BREAK};
use lexspace_core::space::{NumberMode, Period};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub spaces: SpacesConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_sentence_tolerance")]
    pub sentence_tolerance: usize,
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            sentence_tolerance: default_sentence_tolerance(),
            context_chars: default_context_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn to_core(&self) -> lexspace_core::Result<lexspace_core::chunk::ChunkingConfig> {
        Ok(
            lexspace_core::chunk::ChunkingConfig::new(self.chunk_size, self.overlap)?
                .with_sentence_tolerance(self.sentence_tolerance)
                .with_context_chars(self.context_chars),
        )
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_overlap() -> usize {
    200
}
fn default_sentence_tolerance() -> usize {
    lexspace_core::chunk::DEFAULT_SENTENCE_TOLERANCE
}
fn default_context_chars() -> usize {
    lexspace_core::chunk::DEFAULT_CONTEXT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpacesConfig {
    #[serde(default = "default_practice_areas")]
    pub practice_areas: Vec<String>,
    #[serde(default = "default_document_types")]
    pub document_types: Vec<String>,
    /// Value given to absent vocabulary slots; must be <= 0.
    #[serde(default = "default_category_negative_filter")]
    pub category_negative_filter: f32,
    #[serde(default = "default_true")]
    pub uncategorized_as_category: bool,
    /// Document extension keys exposed as filterable fields
    /// (`extensions.<key>`).
    #[serde(default)]
    pub extension_filters: Vec<String>,
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub recency: RecencyConfig,
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self {
            practice_areas: default_practice_areas(),
            document_types: default_document_types(),
            category_negative_filter: default_category_negative_filter(),
            uncategorized_as_category: true,
            extension_filters: Vec::new(),
            authority: AuthorityConfig::default(),
            recency: RecencyConfig::default(),
        }
    }
}

fn default_practice_areas() -> Vec<String> {
    [
        "personal_injury",
        "employment",
        "contracts",
        "criminal",
        "family",
        "real_estate",
        "tax",
        "immigration",
        "intellectual_property",
        "corporate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_document_types() -> Vec<String> {
    DocumentType::ALL.iter().map(|t| t.as_str().to_string()).collect()
}
fn default_category_negative_filter() -> f32 {
    -0.2
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthorityConfig {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_authority_max")]
    pub max: f64,
    #[serde(default)]
    pub mode: NumberMode,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: default_authority_max(),
            mode: NumberMode::default(),
        }
    }
}

fn default_authority_max() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecencyConfig {
    /// RFC 3339 timestamp ages are measured from; process start if unset.
    #[serde(default)]
    pub reference_time: Option<String>,
    #[serde(default = "default_recency_negative_filter")]
    pub negative_filter: f32,
    #[serde(default = "default_periods")]
    pub periods: Vec<PeriodConfig>,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            reference_time: None,
            negative_filter: default_recency_negative_filter(),
            periods: default_periods(),
        }
    }
}

impl RecencyConfig {
    pub fn reference_timestamp(&self) -> Result<i64> {
        match &self.reference_time {
            Some(raw) => Ok(chrono::DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("spaces.recency.reference_time is not RFC 3339: {}", raw))?
                .timestamp()),
            None => Ok(chrono::Utc::now().timestamp()),
        }
    }

    pub fn core_periods(&self) -> Result<Vec<Period>> {
        let periods = self
            .periods
            .iter()
            .map(|p| Period::days(p.days, p.weight))
            .collect::<lexspace_core::Result<Vec<_>>>()?;
        Ok(periods)
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PeriodConfig {
    pub days: i64,
    pub weight: f32,
}

fn default_recency_negative_filter() -> f32 {
    -0.5
}
fn default_periods() -> Vec<PeriodConfig> {
    vec![
        PeriodConfig {
            days: 30,
            weight: 1.0,
        },
        PeriodConfig {
            days: 365,
            weight: 0.5,
        },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: usize,
    #[serde(default = "default_exploration_limit")]
    pub exploration_limit: usize,
    #[serde(default = "default_deep_dive_limit")]
    pub deep_dive_limit: usize,
    #[serde(default = "default_pool_factor")]
    pub pool_factor: usize,
    #[serde(default)]
    pub weights: DefaultWeights,
    /// Order of equal composite scores, before the final id comparison.
    #[serde(default = "default_tie_break")]
    pub tie_break: Vec<TieBreak>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            discovery_limit: default_discovery_limit(),
            exploration_limit: default_exploration_limit(),
            deep_dive_limit: default_deep_dive_limit(),
            pool_factor: default_pool_factor(),
            weights: DefaultWeights::default(),
            tie_break: default_tie_break(),
        }
    }
}

impl RetrievalConfig {
    pub fn tier_defaults(&self) -> TierDefaults {
        TierDefaults {
            discovery_limit: self.discovery_limit,
            exploration_limit: self.exploration_limit,
            deep_dive_limit: self.deep_dive_limit,
            weights: self.weights,
        }
    }

    pub fn ranker(&self) -> Ranker {
        Ranker::new(self.pool_factor).with_tie_break(self.tie_break.clone())
    }
}

fn default_discovery_limit() -> usize {
    50
}
fn default_exploration_limit() -> usize {
    20
}
fn default_deep_dive_limit() -> usize {
    10
}
fn default_pool_factor() -> usize {
    lexspace_core::search::DEFAULT_POOL_FACTOR
}
fn default_tie_break() -> Vec<TieBreak> {
    DEFAULT_TIE_BREAK.to_vec()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

impl Config {
    /// Fail fast on values the engine would reject later.
    pub fn validate(&self) -> Result<()> {
        self.chunking.to_core()?;

        match self.embedding.provider.as_str() {
            "hashing" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hashing or local.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        if self.spaces.category_negative_filter > 0.0 {
            bail!("spaces.category_negative_filter must be <= 0");
        }
        if self.spaces.authority.min >= self.spaces.authority.max {
            bail!("spaces.authority.min must be < spaces.authority.max");
        }
        if self.spaces.recency.negative_filter > 0.0 {
            bail!("spaces.recency.negative_filter must be <= 0");
        }
        if self.spaces.recency.periods.is_empty() {
            bail!("spaces.recency.periods must not be empty");
        }
        if self.spaces.recency.periods.iter().any(|p| p.days <= 0) {
            bail!("spaces.recency.periods[].days must be > 0");
        }
        self.spaces
            .recency
            .core_periods()
            .context("spaces.recency.periods[].days is too large")?;
        self.spaces.recency.reference_timestamp()?;

        for (name, limit) in [
            ("discovery_limit", self.retrieval.discovery_limit),
            ("exploration_limit", self.retrieval.exploration_limit),
            ("deep_dive_limit", self.retrieval.deep_dive_limit),
            ("pool_factor", self.retrieval.pool_factor),
        ] {
            if limit == 0 {
                bail!("retrieval.{} must be >= 1", name);
            }
        }
        let w = &self.retrieval.weights;
        if [w.text, w.categorical, w.number, w.recency]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            bail!("retrieval.weights must be finite and >= 0");
        }

        if self.ingest.workers == 0 {
            bail!("ingest.workers must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
