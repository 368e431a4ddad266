//! Sliding-window text chunking.
//!
//! Walks the text in windows of `max_chars`, advancing by
//! `max_chars - overlap_chars` per step, preferring to break at a nearby
//! sentence or paragraph boundary so chunks do not split mid-sentence when
//! avoidable. Pure and deterministic: identical input always yields an
//! identical chunk sequence.

use crate::error::ContentError;
use crate::types::Chunk;

/// How far back from the preferred window end to look for a break point.
const BREAK_LOOKBACK_CHARS: usize = 200;

pub struct TextChunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl TextChunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, ContentError> {
        if max_chars == 0 {
            return Err(ContentError::InvalidArgument(
                "max_chars must be > 0".into(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(ContentError::InvalidArgument(format!(
                "overlap_chars ({}) must be < max_chars ({})",
                overlap_chars, max_chars
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    /// Split `text` into ordered, overlapping chunks for `source_id`.
    /// Empty or whitespace-only input yields an empty sequence. The final
    /// chunk may be shorter than `max_chars`.
    pub fn chunk(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if text.len() <= self.max_chars {
            return vec![Chunk {
                source_id: source_id.to_string(),
                ordinal: 0,
                text: text.to_string(),
                start_offset: 0,
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut ordinal = 0;

        while start < text.len() {
            let raw_end = (start + self.max_chars).min(text.len());
            let end = snap_to_char_boundary(text, raw_end);

            // Try to find a sentence boundary near the end
            let mut actual_end = if end < text.len() {
                self.find_break_point(text, start, end)
            } else {
                end
            };
            // Always advance by at least one full character.
            if actual_end <= start {
                actual_end = next_char_boundary(text, start);
            }

            chunks.push(Chunk {
                source_id: source_id.to_string(),
                ordinal,
                text: text[start..actual_end].to_string(),
                start_offset: start,
            });
            ordinal += 1;

            // Move forward with overlap
            let step = if actual_end - start > self.overlap_chars {
                actual_end - start - self.overlap_chars
            } else {
                actual_end - start
            };

            let raw_next = start + step;
            start = snap_to_char_boundary(text, raw_next);
            if start >= text.len() {
                break;
            }
        }

        chunks
    }

    fn find_break_point(&self, text: &str, start: usize, preferred_end: usize) -> usize {
        let raw_search_start = if preferred_end > start + BREAK_LOOKBACK_CHARS {
            preferred_end - BREAK_LOOKBACK_CHARS
        } else {
            start
        };
        let search_start = snap_to_char_boundary(text, raw_search_start);
        let safe_end = snap_to_char_boundary(text, preferred_end);

        if search_start >= safe_end {
            return safe_end;
        }

        let search_region = &text[search_start..safe_end];

        // Priority: paragraph break > sentence end > line break > word break
        if let Some(pos) = search_region.rfind("\n\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(". ") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(".\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind('\n') {
            return search_start + pos + 1;
        }
        if let Some(pos) = search_region.rfind(' ') {
            return search_start + pos + 1;
        }

        safe_end
    }
}

/// Snap a byte offset to the nearest valid UTF-8 char boundary (rounding down).
/// If `pos` is already on a boundary, returns `pos` unchanged.
/// If `pos` is beyond text length, returns `text.len()`.
fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

/// First char boundary strictly after `pos`, capped at `text.len()`.
fn next_char_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos + 1;
    while p < text.len() && !text.is_char_boundary(p) {
        p += 1;
    }
    p.min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 150).is_err());
        assert!(TextChunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        let chunker = TextChunker::new(1000, 100).unwrap();
        assert!(chunker.chunk("doc", "").is_empty());
        assert!(chunker.chunk("doc", "   \n\t  ").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::new(1000, 100).unwrap();
        let chunks = chunker.chunk("doc", "A short paragraph.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].text, "A short paragraph.");
    }

    #[test]
    fn test_2500_chars_yields_three_chunks() {
        // No break characters, so windows land exactly on max_chars.
        let text = "x".repeat(2500);
        let chunker = TextChunker::new(1000, 100).unwrap();
        let chunks = chunker.chunk("doc", &text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[1].text.len(), 1000);
        assert_eq!(chunks[2].text.len(), 700);

        // Consecutive chunks share at least 90 characters.
        for pair in chunks.windows(2) {
            let overlap = pair[0].start_offset + pair[0].text.len() - pair[1].start_offset;
            assert!(overlap >= 90, "overlap was {}", overlap);
        }
    }

    #[test]
    fn test_chunks_reconstruct_source() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(60);
        let chunker = TextChunker::new(300, 50).unwrap();
        let chunks = chunker.chunk("doc", &text);
        assert!(chunks.len() > 1);

        // Concatenation accounting for overlap reconstructs the input.
        let mut rebuilt = String::new();
        for chunk in &chunks {
            let already = rebuilt.len();
            assert!(chunk.start_offset <= already, "gap between chunks");
            rebuilt.push_str(&chunk.text[already - chunk.start_offset..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_every_chunk_within_max() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(80);
        let chunker = TextChunker::new(400, 60).unwrap();
        for chunk in chunker.chunk("doc", &text) {
            assert!(chunk.text.len() <= 400);
        }
    }

    #[test]
    fn test_ordinals_are_monotonic() {
        let text = "word ".repeat(1000);
        let chunker = TextChunker::new(250, 25).unwrap();
        let chunks = chunker.chunk("doc", &text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Sentence one. Sentence two.\n\nA new paragraph with more text. ".repeat(40);
        let chunker = TextChunker::new(500, 80).unwrap();
        assert_eq!(chunker.chunk("doc", &text), chunker.chunk("doc", &text));
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let mut text = "y".repeat(900);
        text.push_str(". ");
        text.push_str(&"z".repeat(600));
        let chunker = TextChunker::new(1000, 100).unwrap();
        let chunks = chunker.chunk("doc", &text);
        // First window [0, 1000) contains ". " at 900; break lands after it.
        assert!(chunks[0].text.ends_with(". "));
        assert_eq!(chunks[0].text.len(), 902);
    }

    #[test]
    fn test_multibyte_input_does_not_panic() {
        let text = "これは長い日本語のテキストです。".repeat(120);
        let chunker = TextChunker::new(300, 40).unwrap();
        let chunks = chunker.chunk("doc", &text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            // Slicing stayed on char boundaries.
            assert!(chunk.text.chars().count() > 0);
        }
    }
}
