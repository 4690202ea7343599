//! Embedding spaces.
//!
//! A [`Space`] projects one field of an entity into a fixed-length vector
//! with its own similarity semantic:
//!
//! | Kind | Encoder | Seeks |
//! |------|---------|-------|
//! | [`SpaceKind::Text`] | external sentence encoder | semantic similarity |
//! | [`SpaceKind::Categorical`] | n-hot over a fixed vocabulary | set membership |
//! | [`SpaceKind::Number`] | angle encoding of a bounded scalar | maximum or target |
//! | [`SpaceKind::Recency`] | multi-window linear decay | recent items |
//!
//! Every encoder is a pure function of its input plus its own immutable
//! configuration; none looks at other entities.

mod categorical;
mod number;
mod recency;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use categorical::CategoricalSpace;
pub use number::{NumberMode, NumberSpace};
pub use recency::{Period, RecencySpace};

use crate::embedding::{cosine_similarity, dot, TextEncoder};
use crate::error::{Error, Result};
use crate::models::{Entity, FieldKind, FieldValue};

/// Similarity semantic applied between a query vector and an entity vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Cosine,
    /// Used by spaces whose vectors are normalised (or scaled) by construction.
    Dot,
}

impl Similarity {
    pub fn score(&self, query: &[f32], entity: &[f32]) -> f64 {
        match self {
            Similarity::Cosine => cosine_similarity(query, entity) as f64,
            Similarity::Dot => dot(query, entity) as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    Text,
    Categorical,
    Number,
    Recency,
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpaceKind::Text => "text",
            SpaceKind::Categorical => "categorical",
            SpaceKind::Number => "number",
            SpaceKind::Recency => "recency",
        };
        f.write_str(s)
    }
}

/// What a query asks a number space for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberTarget {
    /// Higher is better.
    Maximum,
    /// Closest to the given value is best.
    Similar(f64),
}

/// Query-side input for one space.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTarget {
    Text(String),
    Categories(Vec<String>),
    Number(NumberTarget),
    /// Prefer entities close to the space's reference time.
    Recent,
}

/// Text space backed by an external sentence encoder.
#[derive(Clone)]
pub struct TextSpace {
    name: String,
    field: String,
    encoder: Arc<dyn TextEncoder>,
}

impl TextSpace {
    pub fn new(name: impl Into<String>, field: impl Into<String>, encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            encoder,
        }
    }

    pub fn model_id(&self) -> &str {
        self.encoder.model_id()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.encoder.encode(text)?;
        if vector.len() != self.encoder.dims() {
            return Err(Error::Encoder(format!(
                "model '{}' returned {} dims, expected {}",
                self.encoder.model_id(),
                vector.len(),
                self.encoder.dims()
            )));
        }
        Ok(vector)
    }
}

impl fmt::Debug for TextSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextSpace")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("model_id", &self.encoder.model_id())
            .field("dims", &self.encoder.dims())
            .finish()
    }
}

/// One named projection of an entity field into a vector.
#[derive(Debug, Clone)]
pub enum Space {
    Text(TextSpace),
    Categorical(CategoricalSpace),
    Number(NumberSpace),
    Recency(RecencySpace),
}

impl Space {
    pub fn name(&self) -> &str {
        match self {
            Space::Text(s) => &s.name,
            Space::Categorical(s) => s.name(),
            Space::Number(s) => s.name(),
            Space::Recency(s) => s.name(),
        }
    }

    /// The entity field backing this space.
    pub fn field(&self) -> &str {
        match self {
            Space::Text(s) => &s.field,
            Space::Categorical(s) => s.field(),
            Space::Number(s) => s.field(),
            Space::Recency(s) => s.field(),
        }
    }

    pub fn kind(&self) -> SpaceKind {
        match self {
            Space::Text(_) => SpaceKind::Text,
            Space::Categorical(_) => SpaceKind::Categorical,
            Space::Number(_) => SpaceKind::Number,
            Space::Recency(_) => SpaceKind::Recency,
        }
    }

    pub fn dims(&self) -> usize {
        match self {
            Space::Text(s) => s.encoder.dims(),
            Space::Categorical(s) => s.dims(),
            Space::Number(_) => NumberSpace::DIMS,
            Space::Recency(s) => s.dims(),
        }
    }

    pub fn similarity(&self) -> Similarity {
        match self {
            Space::Text(_) => Similarity::Cosine,
            _ => Similarity::Dot,
        }
    }

    /// Model identifier for spaces backed by an external model.
    pub fn model_id(&self) -> Option<&str> {
        match self {
            Space::Text(s) => Some(s.model_id()),
            _ => None,
        }
    }

    /// Whether a field of the given shape can back this space.
    pub fn accepts(&self, kind: FieldKind) -> bool {
        match self {
            Space::Text(_) | Space::Categorical(_) => {
                matches!(kind, FieldKind::Text | FieldKind::Labels)
            }
            Space::Number(_) | Space::Recency(_) => kind == FieldKind::Number,
        }
    }

    /// Encode a field value. A missing value encodes to the zero vector,
    /// which scores `0.0` under both similarity semantics.
    pub fn embed(&self, value: Option<&FieldValue>) -> Result<Vec<f32>> {
        let Some(value) = value else {
            return Ok(vec![0.0; self.dims()]);
        };
        match (self, value) {
            (Space::Text(s), FieldValue::Text(text)) => s.encode(text),
            (Space::Text(s), FieldValue::Labels(labels)) => {
                let joined = labels.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
                s.encode(&joined)
            }
            (Space::Categorical(s), FieldValue::Text(label)) => Ok(s.embed([label.as_str()])),
            (Space::Categorical(s), FieldValue::Labels(labels)) => {
                Ok(s.embed(labels.iter().map(String::as_str)))
            }
            (Space::Number(s), FieldValue::Number(n)) => Ok(s.embed(*n)),
            (Space::Recency(s), FieldValue::Number(ts)) => Ok(s.embed(*ts as i64)),
            _ => Err(Error::IndexConfig(format!(
                "field '{}' has the wrong shape for {} space '{}'",
                self.field(),
                self.kind(),
                self.name()
            ))),
        }
    }

    pub fn embed_entity(&self, entity: &Entity) -> Result<Vec<f32>> {
        self.embed(entity.field(self.field()).as_ref())
    }

    /// Build the query-side vector for `target`.
    pub fn query_vector(&self, target: &QueryTarget) -> Result<Vec<f32>> {
        match (self, target) {
            (Space::Text(s), QueryTarget::Text(text)) => s.encode(text),
            (Space::Categorical(s), QueryTarget::Categories(categories)) => {
                s.query_vector(categories)
            }
            (Space::Number(s), QueryTarget::Number(target)) => Ok(s.query_vector(*target)),
            (Space::Recency(s), QueryTarget::Recent) => Ok(s.query_vector()),
            _ => Err(Error::QueryComposition(format!(
                "query target {:?} does not fit {} space '{}'",
                target,
                self.kind(),
                self.name()
            ))),
        }
    }
}

impl From<TextSpace> for Space {
    fn from(s: TextSpace) -> Self {
        Space::Text(s)
    }
}

impl From<CategoricalSpace> for Space {
    fn from(s: CategoricalSpace) -> Self {
        Space::Categorical(s)
    }
}

impl From<NumberSpace> for Space {
    fn from(s: NumberSpace) -> Self {
        Space::Number(s)
    }
}

impl From<RecencySpace> for Space {
    fn from(s: RecencySpace) -> Self {
        Space::Recency(s)
    }
}
