//! Sentence-aware overlapping passage chunker.
//!
//! Splits a document's content into overlapping [`TextSpan`]s with exact
//! offsets, so every passage can be cited back to its source text.
//!
//! # Algorithm
//!
//! 1. Place a window of `chunk_size` bytes at the current start.
//! 2. If the window reaches the end of the text, emit it and stop.
//! 3. Otherwise search backward from the raw cut point, at most
//!    `sentence_tolerance` bytes, for `.`, `!`, `?` or a newline and cut
//!    right after it. Without one, cut at the raw window edge.
//! 4. Start the next window exactly `overlap` bytes before the cut.
//!
//! Offsets are UTF-8 byte offsets and always fall on `char` boundaries, so
//! `&text[span.start..span.end]` is the passage text. Nothing is ever
//! truncated: the last span always ends at `text.len()`.
//!
//! # Example
//!
//! ```rust
//! use lexspace_core::chunk::{chunk_text, reconstruct};
//!
//! let text = "a".repeat(4500);
//! let spans = chunk_text(&text, 2000, 200).unwrap();
//! let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
//! assert_eq!(starts, vec![0, 1800, 3600]);
//! assert_eq!(spans[2].end, 4500);
//! assert_eq!(reconstruct(&spans), text);
//! ```

use serde::Serialize;

use crate::error::{Error, Result};

/// How far back from a raw cut point a sentence boundary is searched.
pub const DEFAULT_SENTENCE_TOLERANCE: usize = 50;

/// Length of the citation context kept on each side of a chunk.
pub const DEFAULT_CONTEXT_CHARS: usize = 40;

/// Validated `(chunk_size, overlap)` pair plus snapping and context knobs.
///
/// Chunking parameters belong to an index, not to the process: a chunk
/// index for precise citations may use a different granularity than
/// another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
    sentence_tolerance: usize,
    context_chars: usize,
}

impl ChunkingConfig {
    /// Fails fast unless `0 < overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if overlap == 0 {
            return Err(Error::ChunkingConfig("overlap must be > 0".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::ChunkingConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            sentence_tolerance: DEFAULT_SENTENCE_TOLERANCE,
            context_chars: DEFAULT_CONTEXT_CHARS,
        })
    }

    pub fn with_sentence_tolerance(mut self, tolerance: usize) -> Self {
        self.sentence_tolerance = tolerance;
        self
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn sentence_tolerance(&self) -> usize {
        self.sentence_tolerance
    }

    pub fn context_chars(&self) -> usize {
        self.context_chars
    }
}

/// Half-open byte range `[start, end)` into the chunked text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A span together with the text it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Compute chunk spans for `text`. Empty text yields no spans.
pub fn chunk_spans(text: &str, config: &ChunkingConfig) -> Vec<Span> {
    let len = text.len();
    let mut spans = Vec::new();
    if len == 0 {
        return spans;
    }

    let mut start = 0usize;
    loop {
        if start + config.chunk_size >= len {
            spans.push(Span { start, end: len });
            break;
        }

        let raw_end = floor_char_boundary(text, start + config.chunk_size);
        // The next window starts at `end - overlap`, which must stay ahead of `start`.
        let min_end = start + config.overlap + 1;
        let end = sentence_cut(text, raw_end, config.sentence_tolerance, min_end).unwrap_or(raw_end);
        let end = if end < min_end {
            ceil_char_boundary(text, min_end)
        } else {
            end
        };

        spans.push(Span { start, end });
        if end >= len {
            break;
        }

        let next = floor_char_boundary(text, end - config.overlap);
        start = if next > start {
            next
        } else {
            ceil_char_boundary(text, start + 1)
        };
    }

    tracing::debug!(
        len,
        chunk_size = config.chunk_size,
        overlap = config.overlap,
        chunks = spans.len(),
        "chunked text"
    );
    spans
}

/// Convenience wrapper: validate the parameters and return spans with text.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextSpan>> {
    let config = ChunkingConfig::new(chunk_size, overlap)?;
    Ok(chunk_spans(text, &config)
        .into_iter()
        .map(|s| TextSpan {
            start: s.start,
            end: s.end,
            text: text[s.start..s.end].to_string(),
        })
        .collect())
}

/// Rebuild the original text from ordered spans by dropping overlaps.
pub fn reconstruct(spans: &[TextSpan]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for span in spans {
        let skip = covered.saturating_sub(span.start).min(span.text.len());
        out.push_str(&span.text[skip..]);
        covered = covered.max(span.end);
    }
    out
}

/// Up to `context_chars` characters immediately before and after `span`.
///
/// Walks outward from the span edges only, so the cost is independent of
/// where the span sits in the text.
pub fn context_window(text: &str, span: Span, context_chars: usize) -> (String, String) {
    if context_chars == 0 {
        return (String::new(), String::new());
    }
    let head = &text[..span.start];
    let from = head
        .char_indices()
        .rev()
        .nth(context_chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[span.end..];
    let to = tail
        .char_indices()
        .nth(context_chars)
        .map(|(i, _)| i)
        .unwrap_or(tail.len());
    (head[from..].to_string(), tail[..to].to_string())
}

/// Search backward from `raw_end` for a sentence boundary and return the
/// cut position right after it, if one lies in `[max(raw_end - tolerance, min_end), raw_end]`.
fn sentence_cut(text: &str, raw_end: usize, tolerance: usize, min_end: usize) -> Option<usize> {
    let lowest_cut = raw_end.saturating_sub(tolerance).max(min_end).max(1);
    if lowest_cut > raw_end {
        return None;
    }
    let bytes = text.as_bytes();
    // Boundary bytes are ASCII, so the position after one is a char boundary.
    (lowest_cut - 1..raw_end)
        .rev()
        .find(|&p| matches!(bytes[p], b'.' | b'!' | b'?' | b'\n'))
        .map(|p| p + 1)
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans_of(text: &str, size: usize, overlap: usize) -> Vec<TextSpan> {
        chunk_text(text, size, overlap).unwrap()
    }

    fn assert_invariants(text: &str, spans: &[TextSpan], overlap: usize, tolerance: usize) {
        assert_eq!(reconstruct(spans), text, "round-trip failed");
        assert_eq!(spans.last().map(|s| s.end), Some(text.len()));
        assert_eq!(spans[0].start, 0);
        for s in spans {
            assert_eq!(s.text, &text[s.start..s.end]);
            assert!(s.start < s.end);
        }
        for pair in spans.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[1].start <= pair[0].end, "gap between chunks");
            let shared = pair[0].end - pair[1].start;
            assert!(shared <= overlap + tolerance, "overlap {} too large", shared);
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(spans_of("", 100, 10).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let spans = spans_of("Hello, world!", 2000, 200);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, 13);
        assert_eq!(spans[0].text, "Hello, world!");
    }

    #[test]
    fn test_4500_chars_three_chunks() {
        let text = "x".repeat(4500);
        let spans = spans_of(&text, 2000, 200);
        assert_eq!(spans.len(), 3);
        let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 1800, 3600]);
        assert_eq!(spans[2].end, 4500);
        assert_invariants(&text, &spans, 200, 0);
    }

    #[test]
    fn test_4500_chars_with_sentences() {
        let sentence = "The court held that the statute of limitations applies. ";
        let text: String = sentence.repeat(4500 / sentence.len() + 1)[..4500].to_string();
        let spans = spans_of(&text, 2000, 200);
        assert_eq!(spans.len(), 3);
        for (span, expected) in spans.iter().zip([0usize, 1800, 3600]) {
            assert!(span.start <= expected && expected - span.start <= 50);
        }
        assert_eq!(spans[2].end, 4500);
        assert_invariants(&text, &spans, 200, 0);
    }

    #[test]
    fn test_cuts_after_sentence_boundary() {
        let mut text = "a".repeat(90);
        text.push('.');
        text.push_str(&"b".repeat(200));
        let spans = spans_of(&text, 100, 20);
        assert_eq!(spans[0].end, 91);
        assert!(spans[0].text.ends_with('.'));
        assert_eq!(spans[1].start, 71);
    }

    #[test]
    fn test_boundary_outside_tolerance_ignored() {
        let mut text = "a".repeat(10);
        text.push('.');
        text.push_str(&"b".repeat(300));
        let config = ChunkingConfig::new(100, 20).unwrap().with_sentence_tolerance(50);
        let spans = chunk_spans(&text, &config);
        assert_eq!(spans[0].end, 100);
    }

    #[test]
    fn test_newline_is_boundary() {
        let text = format!("{}\n{}", "a".repeat(95), "b".repeat(100));
        let spans = spans_of(&text, 100, 10);
        assert_eq!(spans[0].end, 96);
    }

    #[test]
    fn test_multibyte_round_trip() {
        let text = "§ 1983 — Civil action for deprivation of rights. ".repeat(40);
        for (size, overlap) in [(7, 3), (64, 16), (300, 50), (1000, 999)] {
            let spans = spans_of(&text, size, overlap);
            assert_invariants(&text, &spans, overlap + 4, DEFAULT_SENTENCE_TOLERANCE);
        }
    }

    #[test]
    fn test_tiny_windows_make_progress() {
        let text = "éééé";
        let spans = spans_of(text, 3, 2);
        assert_eq!(reconstruct(&spans), text);
        assert_eq!(spans.last().unwrap().end, text.len());
        assert!(spans.len() <= text.len());
    }

    #[test]
    fn test_config_errors() {
        assert!(matches!(ChunkingConfig::new(100, 100), Err(Error::ChunkingConfig(_))));
        assert!(matches!(ChunkingConfig::new(100, 150), Err(Error::ChunkingConfig(_))));
        assert!(matches!(ChunkingConfig::new(100, 0), Err(Error::ChunkingConfig(_))));
        assert!(chunk_text("abc", 10, 10).is_err());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha. Beta! Gamma? Delta.\n".repeat(100);
        assert_eq!(spans_of(&text, 120, 30), spans_of(&text, 120, 30));
    }

    #[test]
    fn test_context_window() {
        let text = "0123456789abcdefghij";
        let (before, after) = context_window(text, Span { start: 10, end: 15 }, 4);
        assert_eq!(before, "6789");
        assert_eq!(after, "fghi");
        let (before, after) = context_window(text, Span { start: 0, end: 20 }, 4);
        assert!(before.is_empty());
        assert!(after.is_empty());
        let (before, after) = context_window(text, Span { start: 2, end: 18 }, 4);
        assert_eq!(before, "01");
        assert_eq!(after, "ij");
        let (before, after) = context_window(text, Span { start: 10, end: 15 }, 0);
        assert!(before.is_empty() && after.is_empty());
    }

    #[test]
    fn test_context_window_counts_chars_not_bytes() {
        let text = "§§§§abc€€€€";
        let start = "§§§§".len();
        let end = start + 3;
        let (before, after) = context_window(text, Span { start, end }, 2);
        assert_eq!(before, "§§");
        assert_eq!(after, "€€");
    }

    #[test]
    fn test_context_windows_on_large_document() {
        let text = "The court held that the statute applies. ".repeat(200_000);
        let config = ChunkingConfig::new(2000, 200).unwrap();
        let started = std::time::Instant::now();
        let spans = chunk_spans(&text, &config);
        let windows: Vec<(String, String)> = spans
            .iter()
            .map(|span| context_window(&text, *span, 40))
            .collect();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let last = spans[spans.len() - 1];
        assert_eq!(windows[spans.len() - 1].0, text[last.start - 40..last.start]);
        assert!(windows[spans.len() - 1].1.is_empty());
        let middle = spans[spans.len() / 2];
        assert_eq!(windows[spans.len() / 2].1, text[middle.end..middle.end + 40]);
    }
}
