//! Core data models: source records, documents, chunks and the
//! [`Entity`] view the indexes and stores operate on.
//!
//! A [`Document`] is the sole owner of its [`Chunk`]s. Chunks only hold the
//! parent id plus a copy of the inheritable scalar fields taken at
//! composition time, so they can be filtered and ranked without a join.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Authority level of a legal resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Primary,
    #[default]
    Secondary,
    Tertiary,
}

impl AuthorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityLevel::Primary => "primary",
            AuthorityLevel::Secondary => "secondary",
            AuthorityLevel::Tertiary => "tertiary",
        }
    }
}

impl fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(AuthorityLevel::Primary),
            "secondary" => Ok(AuthorityLevel::Secondary),
            "tertiary" => Ok(AuthorityLevel::Tertiary),
            other => Err(Error::validation(
                "authority_level",
                format!("unknown authority level '{}'", other),
            )),
        }
    }
}

/// Kind of legal document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Statute,
    Case,
    Regulation,
    Guidance,
    Rule,
    #[default]
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Statute,
        DocumentType::Case,
        DocumentType::Regulation,
        DocumentType::Guidance,
        DocumentType::Rule,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Statute => "statute",
            DocumentType::Case => "case",
            DocumentType::Regulation => "regulation",
            DocumentType::Guidance => "guidance",
            DocumentType::Rule => "rule",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| {
                Error::validation(
                    "document_type",
                    format!("unknown document type '{}'", lowered),
                )
            })
    }
}

/// Raw record handed over by the ingestion pipeline.
///
/// Every field is optional at this stage; the entity composer decides
/// which ones are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub authority_level: Option<AuthorityLevel>,
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub practice_areas: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub authority_score: Option<f64>,
    #[serde(default)]
    pub recency_timestamp: Option<i64>,
    #[serde(default)]
    pub citation_count: Option<u64>,
    /// Specialised optional fields (`injury_type`, `medical_specialty`, ...).
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

/// A top-level legal resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub jurisdiction: String,
    pub authority_level: AuthorityLevel,
    pub document_type: DocumentType,
    pub practice_areas: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    /// Bounded to `[0.0, 1.0]`.
    pub authority_score: f64,
    /// Seconds since the Unix epoch.
    pub recency_timestamp: i64,
    pub citation_count: u64,
    pub extensions: BTreeMap<String, String>,
    /// SHA-256 of `content`, for change detection on re-ingestion.
    pub content_hash: String,
}

/// A contiguous span of exactly one document's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{parent_id}_chunk_{chunk_index}"`.
    pub id: String,
    pub parent_id: String,
    pub chunk_index: usize,
    /// Byte offset into the parent's content (on a `char` boundary).
    pub start: usize,
    /// Exclusive end offset into the parent's content.
    pub end: usize,
    /// Always equal to `parent.content[start..end]`.
    pub text: String,
    pub context_before: String,
    pub context_after: String,
    pub hash: String,
    // Copied from the parent at composition time.
    pub jurisdiction: String,
    pub authority_level: AuthorityLevel,
    pub document_type: DocumentType,
    pub practice_areas: BTreeSet<String>,
    pub authority_score: f64,
    pub recency_timestamp: i64,
    pub citation_count: u64,
}

/// Exact-citation trace from a chunk back to its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub parent_id: String,
    pub start: usize,
    pub end: usize,
    pub context_before: String,
    pub context_after: String,
}

/// The entity types an index can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Document,
    Chunk,
}

const DOCUMENT_FIELDS: &[&str] = &[
    "id",
    "title",
    "content",
    "jurisdiction",
    "authority_level",
    "document_type",
    "practice_areas",
    "topics",
    "authority_score",
    "recency_timestamp",
    "citation_count",
];

const CHUNK_FIELDS: &[&str] = &[
    "id",
    "parent_id",
    "chunk_index",
    "content",
    "start_offset",
    "end_offset",
    "jurisdiction",
    "authority_level",
    "document_type",
    "practice_areas",
    "authority_score",
    "recency_timestamp",
    "citation_count",
];

/// Prefix addressing a document extension field, e.g. `extensions.injury_type`.
pub const EXTENSION_PREFIX: &str = "extensions.";

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Document => "document",
            EntityType::Chunk => "chunk",
        }
    }

    /// Static field schema of this entity type.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EntityType::Document => DOCUMENT_FIELDS,
            EntityType::Chunk => CHUNK_FIELDS,
        }
    }

    /// Whether `field` exists on this entity type. Documents additionally
    /// accept any `extensions.<key>` field.
    pub fn has_field(&self, field: &str) -> bool {
        if self.fields().contains(&field) {
            return true;
        }
        *self == EntityType::Document
            && field
                .strip_prefix(EXTENSION_PREFIX)
                .is_some_and(|key| !key.is_empty())
    }
}

/// Value shape of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Labels,
    Number,
}

impl EntityType {
    /// Value shape of `field`, or `None` if this entity type has no such field.
    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        if !self.has_field(field) {
            return None;
        }
        let kind = match field {
            "practice_areas" | "topics" => FieldKind::Labels,
            "authority_score" | "recency_timestamp" | "citation_count" | "chunk_index"
            | "start_offset" | "end_offset" => FieldKind::Number,
            _ => FieldKind::Text,
        };
        Some(kind)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field value read off an entity, used by encoders and filters.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Labels(BTreeSet<String>),
    Number(f64),
}

/// A document or chunk, as stored in and returned from an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum Entity {
    Document(Document),
    Chunk(Chunk),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Document(d) => &d.id,
            Entity::Chunk(c) => &c.id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Document(_) => EntityType::Document,
            Entity::Chunk(_) => EntityType::Chunk,
        }
    }

    /// Id of the owning document: the document's own id, or a chunk's parent.
    pub fn document_id(&self) -> &str {
        match self {
            Entity::Document(d) => &d.id,
            Entity::Chunk(c) => &c.parent_id,
        }
    }

    pub fn authority_score(&self) -> f64 {
        match self {
            Entity::Document(d) => d.authority_score,
            Entity::Chunk(c) => c.authority_score,
        }
    }

    pub fn citation_count(&self) -> u64 {
        match self {
            Entity::Document(d) => d.citation_count,
            Entity::Chunk(c) => c.citation_count,
        }
    }

    /// Citation provenance; only chunks carry one.
    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            Entity::Document(_) => None,
            Entity::Chunk(c) => Some(Provenance {
                parent_id: c.parent_id.clone(),
                start: c.start,
                end: c.end,
                context_before: c.context_before.clone(),
                context_after: c.context_after.clone(),
            }),
        }
    }

    /// Read a named field. Returns `None` for fields the entity type does
    /// not have and for unset extension fields.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            Entity::Document(d) => document_field(d, name),
            Entity::Chunk(c) => chunk_field(c, name),
        }
    }
}

fn document_field(d: &Document, name: &str) -> Option<FieldValue> {
    let value = match name {
        "id" => FieldValue::Text(d.id.clone()),
        "title" => FieldValue::Text(d.title.clone()),
        "content" => FieldValue::Text(d.content.clone()),
        "jurisdiction" => FieldValue::Text(d.jurisdiction.clone()),
        "authority_level" => FieldValue::Text(d.authority_level.to_string()),
        "document_type" => FieldValue::Text(d.document_type.to_string()),
        "practice_areas" => FieldValue::Labels(d.practice_areas.clone()),
        "topics" => FieldValue::Labels(d.topics.clone()),
        "authority_score" => FieldValue::Number(d.authority_score),
        "recency_timestamp" => FieldValue::Number(d.recency_timestamp as f64),
        "citation_count" => FieldValue::Number(d.citation_count as f64),
        other => {
            let key = other.strip_prefix(EXTENSION_PREFIX)?;
            FieldValue::Text(d.extensions.get(key)?.clone())
        }
    };
    Some(value)
}

fn chunk_field(c: &Chunk, name: &str) -> Option<FieldValue> {
    let value = match name {
        "id" => FieldValue::Text(c.id.clone()),
        "parent_id" => FieldValue::Text(c.parent_id.clone()),
        "chunk_index" => FieldValue::Number(c.chunk_index as f64),
        "content" => FieldValue::Text(c.text.clone()),
        "start_offset" => FieldValue::Number(c.start as f64),
        "end_offset" => FieldValue::Number(c.end as f64),
        "jurisdiction" => FieldValue::Text(c.jurisdiction.clone()),
        "authority_level" => FieldValue::Text(c.authority_level.to_string()),
        "document_type" => FieldValue::Text(c.document_type.to_string()),
        "practice_areas" => FieldValue::Labels(c.practice_areas.clone()),
        "authority_score" => FieldValue::Number(c.authority_score),
        "recency_timestamp" => FieldValue::Number(c.recency_timestamp as f64),
        "citation_count" => FieldValue::Number(c.citation_count as f64),
        _ => return None,
    };
    Some(value)
}

/// Hex SHA-256 digest of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
