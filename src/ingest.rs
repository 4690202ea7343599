//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow corpus → composition → chunking → encoding →
//! store. Staging (composition and encoding) is CPU-bound and runs on
//! tokio's blocking pool, bounded by a semaphore of `ingest.workers`
//! permits. Commits run one document at a time in corpus order, so a
//! record that appears twice ends with the later version. A staged record
//! is committed as soon as every earlier record has been, and the number
//! of records staged ahead of the commit point is capped.
//!
//! A record that fails validation or staging is reported and skipped; the
//! rest of the corpus still goes in. A commit failure is reported the same
//! way, and the previously committed version of that document stays
//! visible.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use lexspace_core::ingest::{Catalog, StagedDocument};
use lexspace_core::models::SourceRecord;
use lexspace_core::store::VectorStore;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One corpus line that did not make it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    /// 1-based position in the corpus.
    pub line: usize,
    pub document_id: Option<String>,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub failures: Vec<IngestFailure>,
}

/// A corpus record with its 1-based line number.
#[derive(Debug, Clone)]
pub struct CorpusRecord {
    pub line: usize,
    pub record: SourceRecord,
}

/// Read a JSON Lines corpus: one [`SourceRecord`] per non-blank line.
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open corpus: {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("Failed to read {}:{}", path.display(), line_no))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SourceRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record at {}:{}", path.display(), line_no))?;
        records.push(CorpusRecord {
            line: line_no,
            record,
        });
    }
    Ok(records)
}

/// Stage `records` in parallel and commit them to `store` in corpus order.
///
/// At most `2 * workers` records are staged or waiting for their commit
/// at any time, so memory stays bounded however large the corpus is.
pub async fn ingest_records<S>(
    catalog: Arc<Catalog>,
    store: &S,
    records: Vec<CorpusRecord>,
    workers: usize,
) -> Result<IngestReport>
where
    S: VectorStore + ?Sized,
{
    let total = records.len();
    let workers = workers.max(1);
    let window = commit_window(workers);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    let mut reorder = ReorderBuffer::new();
    let mut records = records.into_iter().enumerate();
    let mut report = IngestReport::default();

    loop {
        while reorder.outstanding() < window {
            let Some((seq, CorpusRecord { line, record })) = records.next() else {
                break;
            };
            reorder.reserve(seq);
            let catalog = Arc::clone(&catalog);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let id = record.id.clone();
                let staged = tokio::task::spawn_blocking(move || catalog.stage(&record)).await?;
                Ok::<_, anyhow::Error>((seq, Staged { line, id, staged }))
            });
        }

        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let (seq, staged) = joined??;
        reorder.insert(seq, staged);
        while let Some(ready) = reorder.pop_ready() {
            commit_staged(&catalog, store, ready, &mut report).await;
        }
    }

    tracing::info!(
        records = total,
        documents = report.documents,
        chunks = report.chunks,
        failures = report.failures.len(),
        "ingested corpus"
    );
    Ok(report)
}

fn commit_window(workers: usize) -> usize {
    workers.saturating_mul(2)
}

struct Staged {
    line: usize,
    id: Option<String>,
    staged: lexspace_core::Result<StagedDocument>,
}

async fn commit_staged<S>(catalog: &Catalog, store: &S, staged: Staged, report: &mut IngestReport)
where
    S: VectorStore + ?Sized,
{
    let Staged { line, id, staged } = staged;
    let outcome = match staged {
        Ok(doc) => catalog.commit(store, doc).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(commit) => {
            report.documents += 1;
            report.chunks += commit.chunks_written;
        }
        Err(err) => {
            tracing::warn!(line, document_id = ?id, error = %err, "skipped record");
            report.failures.push(IngestFailure {
                line,
                document_id: id,
                kind: err.kind().to_string(),
                message: err.to_string(),
            });
        }
    }
}

/// Releases out-of-order results strictly by sequence number.
///
/// `reserve` marks a sequence number as in flight; `outstanding` counts
/// everything reserved but not yet popped.
struct ReorderBuffer<T> {
    next: usize,
    reserved: usize,
    ready: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    fn new() -> Self {
        Self {
            next: 0,
            reserved: 0,
            ready: BTreeMap::new(),
        }
    }

    fn reserve(&mut self, seq: usize) {
        self.reserved = self.reserved.max(seq + 1);
    }

    fn outstanding(&self) -> usize {
        self.reserved - self.next
    }

    fn insert(&mut self, seq: usize, item: T) {
        self.ready.insert(seq, item);
    }

    fn pop_ready(&mut self) -> Option<T> {
        let item = self.ready.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::{build_catalog, CHUNKS_INDEX, DOCUMENTS_INDEX};
    use lexspace_core::embedding::HashingEncoder;
    use lexspace_core::store::memory::InMemoryStore;
    use std::io::Write;

    fn catalog() -> Arc<Catalog> {
        let encoder = Arc::new(HashingEncoder::new(32).unwrap());
        Arc::new(build_catalog(&Config::default(), encoder).unwrap())
    }

    #[test]
    fn test_load_corpus_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","title":"A","content":"x","jurisdiction":"texas"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"b","title":"B","content":"y","jurisdiction":"ohio"}}"#).unwrap();
        let records = load_corpus(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn test_load_corpus_reports_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();
        let err = load_corpus(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(":1"));
    }

    #[tokio::test]
    async fn test_invalid_records_are_reported_not_fatal() {
        let store = InMemoryStore::new();
        let records = vec![
            CorpusRecord {
                line: 1,
                record: SourceRecord {
                    id: Some("ok".into()),
                    title: Some("Ok".into()),
                    content: Some("Some statute text.".into()),
                    jurisdiction: Some("texas".into()),
                    ..Default::default()
                },
            },
            CorpusRecord {
                line: 2,
                record: SourceRecord {
                    id: Some("bad".into()),
                    title: Some("Bad".into()),
                    content: Some("text".into()),
                    ..Default::default()
                },
            },
        ];
        let report = ingest_records(catalog(), &store, records, 2).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, "validation_error");
        assert_eq!(report.failures[0].document_id.as_deref(), Some("bad"));
        assert_eq!(store.len(DOCUMENTS_INDEX).await.unwrap(), 1);
        assert_eq!(store.len(CHUNKS_INDEX).await.unwrap(), 1);
    }

    #[test]
    fn test_reorder_buffer_releases_in_sequence() {
        let mut buffer = ReorderBuffer::new();
        for seq in 0..4 {
            buffer.reserve(seq);
        }
        assert_eq!(buffer.outstanding(), 4);
        buffer.insert(2, "c");
        buffer.insert(1, "b");
        assert_eq!(buffer.pop_ready(), None);
        buffer.insert(0, "a");
        assert_eq!(buffer.pop_ready(), Some("a"));
        assert_eq!(buffer.pop_ready(), Some("b"));
        assert_eq!(buffer.pop_ready(), Some("c"));
        assert_eq!(buffer.pop_ready(), None);
        assert_eq!(buffer.outstanding(), 1);
        buffer.insert(3, "d");
        assert_eq!(buffer.pop_ready(), Some("d"));
        assert_eq!(buffer.outstanding(), 0);
    }

    #[test]
    fn test_commit_window_scales_with_workers() {
        assert_eq!(commit_window(1), 2);
        assert_eq!(commit_window(4), 8);
    }

    #[tokio::test]
    async fn test_long_corpus_commits_in_order_past_the_window() {
        let store = InMemoryStore::new();
        let mut records = Vec::new();
        for line in 1..=40 {
            let id = if line % 3 == 0 { "dup".to_string() } else { format!("doc-{}", line) };
            let jurisdiction = if line % 7 == 0 { None } else { Some("texas".to_string()) };
            records.push(CorpusRecord {
                line,
                record: SourceRecord {
                    id: Some(id),
                    title: Some(format!("Record {}", line)),
                    content: Some(format!("version {}", line)),
                    jurisdiction,
                    ..Default::default()
                },
            });
        }

        let report = ingest_records(catalog(), &store, records, 3).await.unwrap();
        let failed: Vec<usize> = report.failures.iter().map(|f| f.line).collect();
        assert_eq!(failed, vec![7, 14, 21, 28, 35]);
        assert_eq!(report.documents, 35);

        let dup = store.get(DOCUMENTS_INDEX, "dup").await.unwrap().unwrap();
        // Line 39 is the last valid duplicate; line 21 failed validation.
        assert_eq!(
            dup.entity.field("content"),
            Some(lexspace_core::models::FieldValue::Text("version 39".into()))
        );
    }
}
