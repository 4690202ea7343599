//! Entity composition: one [`SourceRecord`] in, one [`Document`] and its
//! ordered [`Chunk`]s out.
//!
//! Composition is deterministic. Chunk ids are `"{parent_id}_chunk_{index}"`,
//! so composing an unchanged record twice with the same chunking config
//! yields identical ids and offsets, and re-ingestion replaces rather than
//! duplicates.

use std::collections::BTreeSet;

use crate::chunk::{chunk_spans, context_window, ChunkingConfig};
use crate::error::{Error, Result};
use crate::models::{content_hash, Chunk, Document, SourceRecord};

/// Authority score given to records that do not carry one.
pub const DEFAULT_AUTHORITY_SCORE: f64 = 0.5;

/// Builds documents and chunks from source records.
#[derive(Debug, Clone)]
pub struct EntityComposer {
    chunking: ChunkingConfig,
}

impl EntityComposer {
    pub fn new(chunking: ChunkingConfig) -> Self {
        Self { chunking }
    }

    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Validate `record` and compose the document with its chunk batch.
    pub fn compose(&self, record: &SourceRecord) -> Result<(Document, Vec<Chunk>)> {
        let document = build_document(record)?;
        let chunks = self.chunk_document(&document);
        tracing::debug!(
            document_id = %document.id,
            content_len = document.content.len(),
            chunks = chunks.len(),
            "composed document"
        );
        Ok((document, chunks))
    }

    /// Split a validated document into chunks carrying a copy of the
    /// inheritable parent fields.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        chunk_spans(&document.content, &self.chunking)
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let text = document.content[span.start..span.end].to_string();
                let (context_before, context_after) =
                    context_window(&document.content, span, self.chunking.context_chars());
                Chunk {
                    id: chunk_id(&document.id, index),
                    parent_id: document.id.clone(),
                    chunk_index: index,
                    start: span.start,
                    end: span.end,
                    hash: content_hash(&text),
                    text,
                    context_before,
                    context_after,
                    jurisdiction: document.jurisdiction.clone(),
                    authority_level: document.authority_level,
                    document_type: document.document_type,
                    practice_areas: document.practice_areas.clone(),
                    authority_score: document.authority_score,
                    recency_timestamp: document.recency_timestamp,
                    citation_count: document.citation_count,
                }
            })
            .collect()
    }
}

/// Deterministic chunk id.
pub fn chunk_id(parent_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", parent_id, index)
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref() {
        None => Err(Error::validation(field, "is required")),
        Some(v) if v.trim().is_empty() => Err(Error::validation(field, "must not be blank")),
        Some(v) => Ok(v),
    }
}

fn build_document(record: &SourceRecord) -> Result<Document> {
    let id = required(&record.id, "id")?;
    let title = required(&record.title, "title")?;
    // Content must be present but may be empty: such a document has no chunks.
    let content = record
        .content
        .as_deref()
        .ok_or_else(|| Error::validation("content", "is required"))?;
    let jurisdiction = required(&record.jurisdiction, "jurisdiction")?;

    let authority_score = record.authority_score.unwrap_or(DEFAULT_AUTHORITY_SCORE);
    if !(0.0..=1.0).contains(&authority_score) {
        return Err(Error::validation(
            "authority_score",
            format!("must be within [0.0, 1.0], got {}", authority_score),
        ));
    }

    Ok(Document {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        jurisdiction: jurisdiction.to_string(),
        authority_level: record.authority_level.unwrap_or_default(),
        document_type: record.document_type.unwrap_or_default(),
        practice_areas: to_label_set(&record.practice_areas),
        topics: to_label_set(&record.topics),
        authority_score,
        recency_timestamp: record.recency_timestamp.unwrap_or(0),
        citation_count: record.citation_count.unwrap_or(0),
        extensions: record.extensions.clone(),
        content_hash: content_hash(content),
    })
}

fn to_label_set(labels: &[String]) -> BTreeSet<String> {
    labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorityLevel, DocumentType};

    fn composer() -> EntityComposer {
        EntityComposer::new(ChunkingConfig::new(2000, 200).unwrap())
    }

    fn record(content: &str) -> SourceRecord {
        SourceRecord {
            id: Some("tx-reg-7".into()),
            title: Some("Texas Administrative Code 7".into()),
            content: Some(content.into()),
            jurisdiction: Some("texas".into()),
            authority_level: Some(AuthorityLevel::Primary),
            document_type: Some(DocumentType::Regulation),
            practice_areas: vec!["personal_injury".into(), " ".into()],
            topics: vec![],
            authority_score: Some(0.8),
            recency_timestamp: Some(1_700_000_000),
            citation_count: Some(4),
            ..Default::default()
        }
    }

    #[test]
    fn test_chunks_inherit_parent_fields() {
        let (doc, chunks) = composer().compose(&record(&"x".repeat(4500))).unwrap();
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.parent_id, doc.id);
            assert_eq!(chunk.jurisdiction, "texas");
            assert_eq!(chunk.authority_level, AuthorityLevel::Primary);
            assert_eq!(chunk.document_type, DocumentType::Regulation);
            assert_eq!(chunk.authority_score, 0.8);
            assert_eq!(chunk.text, &doc.content[chunk.start..chunk.end]);
        }
        assert_eq!(doc.practice_areas.len(), 1);
    }

    #[test]
    fn test_chunk_ids_are_deterministic() {
        let rec = record(&"Sentence one. ".repeat(400));
        let (_, first) = composer().compose(&rec).unwrap();
        let (_, second) = composer().compose(&rec).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].id, "tx-reg-7_chunk_0");
        assert_eq!(first[1].id, "tx-reg-7_chunk_1");
    }

    #[test]
    fn test_context_windows() {
        let (doc, chunks) = composer().compose(&record(&"y".repeat(4500))).unwrap();
        assert!(chunks[0].context_before.is_empty());
        assert_eq!(chunks[1].context_before.len(), 40);
        assert!(doc.content[..chunks[1].start].ends_with(&chunks[1].context_before));
        assert!(chunks[2].context_after.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["id", "title", "content", "jurisdiction"] {
            let mut rec = record("body");
            match field {
                "id" => rec.id = None,
                "title" => rec.title = Some("  ".into()),
                "content" => rec.content = None,
                _ => rec.jurisdiction = None,
            }
            match composer().compose(&rec) {
                Err(Error::Validation { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected validation error on {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_authority_score_bounds() {
        let mut rec = record("body");
        rec.authority_score = Some(1.5);
        assert!(matches!(
            composer().compose(&rec),
            Err(Error::Validation { ref field, .. }) if field == "authority_score"
        ));
        rec.authority_score = Some(f64::NAN);
        assert!(composer().compose(&rec).is_err());
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let rec = SourceRecord {
            id: Some("d".into()),
            title: Some("t".into()),
            content: Some(String::new()),
            jurisdiction: Some("federal".into()),
            ..Default::default()
        };
        let (doc, chunks) = composer().compose(&rec).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(doc.authority_level, AuthorityLevel::Secondary);
        assert_eq!(doc.document_type, DocumentType::Other);
        assert_eq!(doc.authority_score, DEFAULT_AUTHORITY_SCORE);
        assert!(doc.topics.is_empty());
    }
}
