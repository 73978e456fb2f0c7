//! Fixed-size text chunker.
//!
//! Splits extracted document text into non-overlapping slices of
//! `chunk_size` characters. There is no sentence or paragraph awareness:
//! a chunk boundary is a pure positional cut, so concatenating every chunk
//! in index order reproduces the input exactly.
//!
//! Chunk ids have the form `<filename>_<stamp>_chunk<index>`. The stamp
//! comes from an [`IngestionClock`], which never hands out the same value
//! twice within a process, so two uploads of the same filename produce
//! disjoint id sets.
//!
//! # Example
//!
//! ```rust
//! use workflow_rag_core::chunk::chunk_document;
//!
//! let text = "a".repeat(2500);
//! let chunks = chunk_document("notes.pdf", "20240501100000000000", &text, 1000);
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[2].text.len(), 500);
//! assert_eq!(chunks[0].id, "notes.pdf_20240501100000000000_chunk0");
//! ```

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::models::{ChunkMetadata, DocumentChunk};

/// Default slice width in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Split `text` into slices of at most `chunk_size` characters.
///
/// Slicing counts Unicode scalar values, not bytes, so multi-byte
/// characters are never cut. Empty text yields no slices. A `chunk_size`
/// of zero is treated as one.
pub fn split_fixed(text: &str, chunk_size: usize) -> Vec<&str> {
    let size = chunk_size.max(1);
    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == size {
            slices.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }
    slices
}

/// Id prefix shared by every chunk of one ingestion of `filename`.
pub fn chunk_prefix(filename: &str, stamp: &str) -> String {
    format!("{}_{}", filename, stamp)
}

/// Id of chunk `index` under `prefix`.
pub fn chunk_id(prefix: &str, index: usize) -> String {
    format!("{}_chunk{}", prefix, index)
}

/// True if `id` belongs to a chunk ingested from `filename`.
pub fn is_chunk_of(id: &str, filename: &str) -> bool {
    id.strip_prefix(filename)
        .is_some_and(|rest| rest.starts_with('_'))
}

/// Split `text` into [`DocumentChunk`]s for `filename`.
pub fn chunk_document(
    filename: &str,
    stamp: &str,
    text: &str,
    chunk_size: usize,
) -> Vec<DocumentChunk> {
    let prefix = chunk_prefix(filename, stamp);
    split_fixed(text, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(index, slice)| DocumentChunk {
            id: chunk_id(&prefix, index),
            text: slice.to_string(),
            metadata: ChunkMetadata {
                source: filename.to_string(),
                chunk: index,
            },
        })
        .collect()
}

/// Source of strictly increasing ingestion stamps.
///
/// Stamps are UTC wall-clock times at microsecond resolution formatted as
/// `%Y%m%d%H%M%S%6f`. When two calls land on the same microsecond (or the
/// clock steps backwards) the stamp is bumped past the previous one.
#[derive(Debug, Default)]
pub struct IngestionClock {
    last_micros: AtomicI64,
}

impl IngestionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next stamp together with the instant it encodes.
    pub fn next(&self) -> (String, DateTime<Utc>) {
        let now = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);
        let micros = loop {
            let candidate = now.max(prev + 1);
            match self.last_micros.compare_exchange_weak(
                prev,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(actual) => prev = actual,
            }
        };
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        let at = DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)
            .unwrap_or_else(Utc::now);
        (at.format("%Y%m%d%H%M%S%6f").to_string(), at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(split_fixed("", 1000).is_empty());
        assert!(chunk_document("a.pdf", "1", "", 1000).is_empty());
    }

    #[test]
    fn test_2500_chars_make_three_chunks() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_document("doc.pdf", "20240101000000000001", &text, 1000);
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(lens, vec![1000, 1000, 500]);

        let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(chunks[1].metadata.chunk, 1);
        assert_eq!(chunks[1].metadata.source, "doc.pdf");
    }

    #[test]
    fn test_concatenation_reproduces_text() {
        let text = "Grüße aus Köln — ünïcödé text. ".repeat(97);
        let joined: String = split_fixed(&text, 7).concat();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_multibyte_chars_are_counted_not_bytes() {
        let text = "éééé";
        let slices = split_fixed(text, 3);
        assert_eq!(slices, vec!["ééé", "é"]);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_chunk() {
        let text = "x".repeat(2000);
        assert_eq!(split_fixed(&text, 1000).len(), 2);
    }

    #[test]
    fn test_chunk_id_format() {
        let prefix = chunk_prefix("report.pdf", "20240501101500123456");
        assert_eq!(prefix, "report.pdf_20240501101500123456");
        assert_eq!(chunk_id(&prefix, 4), "report.pdf_20240501101500123456_chunk4");
    }

    #[test]
    fn test_is_chunk_of_requires_separator() {
        assert!(is_chunk_of("a.pdf_2024_chunk0", "a.pdf"));
        assert!(!is_chunk_of("a.pdf2_2024_chunk0", "a.pdf"));
        assert!(!is_chunk_of("b.pdf_2024_chunk0", "a.pdf"));
    }

    #[test]
    fn test_clock_stamps_strictly_increase() {
        let clock = IngestionClock::new();
        let stamps: Vec<String> = (0..1000).map(|_| clock.next().0).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }
}
