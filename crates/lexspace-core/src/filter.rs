//! Hard filters: exact, set-membership and range predicates evaluated on
//! scalar entity fields before any similarity ranking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Entity, FieldValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl FilterValue {
    /// Numbers parse as [`FilterValue::Number`], everything else is text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => FilterValue::Number(n),
            _ => FilterValue::Text(trimmed.to_string()),
        }
    }

    fn matches(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FilterValue::Text(t), FieldValue::Text(v)) => v == t,
            (FilterValue::Text(t), FieldValue::Labels(labels)) => labels.contains(t),
            (FilterValue::Number(n), FieldValue::Number(v)) => v == n,
            (FilterValue::Number(n), FieldValue::Text(v)) => v.parse::<f64>().ok() == Some(*n),
            (FilterValue::Number(n), FieldValue::Labels(labels)) => {
                labels.iter().any(|l| l.parse::<f64>().ok() == Some(*n))
            }
            (FilterValue::Text(t), FieldValue::Number(v)) => t.parse::<f64>().ok() == Some(*v),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        FilterValue::Number(n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Predicate {
    /// Exact match; on label-set fields, membership.
    Eq { value: FilterValue },
    /// Matches if any of the values matches.
    In { values: Vec<FilterValue> },
    /// Inclusive numeric range; an open bound is unbounded.
    Range { min: Option<f64>, max: Option<f64> },
}

/// A predicate on one named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::Eq {
                value: value.into(),
            },
        }
    }

    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        Self {
            field: field.into(),
            predicate: Predicate::In {
                values: values.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::Range { min, max },
        }
    }

    /// Whether the predicate tests exact/set membership (as opposed to a range).
    pub fn is_categorical(&self) -> bool {
        !matches!(self.predicate, Predicate::Range { .. })
    }

    /// Evaluate against an entity. Entities lacking the field never match.
    pub fn matches(&self, entity: &Entity) -> bool {
        let Some(value) = entity.field(&self.field) else {
            return false;
        };
        match &self.predicate {
            Predicate::Eq { value: expected } => expected.matches(&value),
            Predicate::In { values } => values.iter().any(|v| v.matches(&value)),
            Predicate::Range { min, max } => match value {
                FieldValue::Number(n) => {
                    min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)
                }
                _ => false,
            },
        }
    }
}

impl FromStr for Filter {
    type Err = Error;

    /// Parses `field=value`, `field=a,b` (any of), `field>=n` and `field<=n`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::QueryComposition(format!(
                "invalid filter '{}': expected field=value, field=a,b, field>=n or field<=n",
                s
            ))
        };
        let parse_bound = |raw: &str| -> Result<f64> {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(invalid)
        };

        if let Some((field, raw)) = s.split_once(">=") {
            return Ok(Filter::range(field.trim(), Some(parse_bound(raw)?), None));
        }
        if let Some((field, raw)) = s.split_once("<=") {
            return Ok(Filter::range(field.trim(), None, Some(parse_bound(raw)?)));
        }
        let (field, raw) = s.split_once('=').ok_or_else(invalid)?;
        let field = field.trim();
        if field.is_empty() || raw.trim().is_empty() {
            return Err(invalid());
        }
        if raw.contains(',') {
            let values: Vec<FilterValue> = raw
                .split(',')
                .filter(|v| !v.trim().is_empty())
                .map(FilterValue::parse)
                .collect();
            return Ok(Filter::one_of(field, values));
        }
        Ok(Filter::eq(field, FilterValue::parse(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{content_hash, AuthorityLevel, Document, DocumentType};

    fn doc() -> Entity {
        Entity::Document(Document {
            id: "d1".into(),
            title: "t".into(),
            content: "c".into(),
            jurisdiction: "texas".into(),
            authority_level: AuthorityLevel::Primary,
            document_type: DocumentType::Regulation,
            practice_areas: ["employment".to_string(), "tax".to_string()]
                .into_iter()
                .collect(),
            topics: Default::default(),
            authority_score: 0.7,
            recency_timestamp: 1_700_000_000,
            citation_count: 3,
            extensions: Default::default(),
            content_hash: content_hash("c"),
        })
    }

    #[test]
    fn test_eq_on_text_and_labels() {
        assert!(Filter::eq("jurisdiction", "texas").matches(&doc()));
        assert!(!Filter::eq("jurisdiction", "ohio").matches(&doc()));
        assert!(Filter::eq("practice_areas", "tax").matches(&doc()));
        assert!(Filter::eq("document_type", "regulation").matches(&doc()));
    }

    #[test]
    fn test_one_of() {
        assert!(Filter::one_of("jurisdiction", ["ohio", "texas"]).matches(&doc()));
        assert!(!Filter::one_of("jurisdiction", ["ohio", "utah"]).matches(&doc()));
    }

    #[test]
    fn test_range() {
        assert!(Filter::range("authority_score", Some(0.5), None).matches(&doc()));
        assert!(!Filter::range("authority_score", Some(0.8), None).matches(&doc()));
        assert!(Filter::range("citation_count", None, Some(3.0)).matches(&doc()));
        assert!(!Filter::range("jurisdiction", Some(0.0), None).matches(&doc()));
    }

    #[test]
    fn test_missing_field_never_matches() {
        assert!(!Filter::eq("extensions.injury_type", "spinal").matches(&doc()));
        assert!(!Filter::eq("parent_id", "d0").matches(&doc()));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "jurisdiction=texas".parse::<Filter>().unwrap(),
            Filter::eq("jurisdiction", "texas")
        );
        assert_eq!(
            "citation_count=3".parse::<Filter>().unwrap(),
            Filter::eq("citation_count", 3.0)
        );
        assert_eq!(
            "document_type=statute,case".parse::<Filter>().unwrap(),
            Filter::one_of("document_type", ["statute", "case"])
        );
        assert_eq!(
            "authority_score>=0.5".parse::<Filter>().unwrap(),
            Filter::range("authority_score", Some(0.5), None)
        );
        assert!("jurisdiction".parse::<Filter>().is_err());
        assert!("authority_score<=high".parse::<Filter>().is_err());
    }

    #[test]
    fn test_numeric_equality_against_text_field() {
        assert!("citation_count=3".parse::<Filter>().unwrap().matches(&doc()));
    }
}
