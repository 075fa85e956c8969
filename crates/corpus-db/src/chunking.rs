//! Text chunking strategies for document ingestion.
//!
//! Splits an ingested document's text into independently versionable
//! chunks. Two strategies are provided:
//!
//! - `ParagraphChunker` — splits at paragraph boundaries (blank lines),
//!   merging small paragraphs and windowing oversized ones
//! - `SlidingWindowChunker` — fixed-size chunks with configurable overlap
//!
//! Offsets are byte offsets into the original text and always fall on UTF-8
//! character boundaries.

use regex::Regex;

use corpus_core::defaults;

/// Configuration for chunking strategies.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size of a chunk in bytes.
    pub max_chunk_size: usize,
    /// Chunks smaller than this may be merged with a neighbor.
    pub min_chunk_size: usize,
    /// Bytes of overlap between adjacent window chunks.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::CHUNK_SIZE,
            min_chunk_size: defaults::CHUNK_MIN_SIZE,
            overlap: defaults::CHUNK_OVERLAP,
        }
    }
}

/// A piece of split text with its position in the original document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Starting byte offset in the original document.
    pub start_offset: usize,
    /// Ending byte offset in the original document.
    pub end_offset: usize,
}

impl TextChunk {
    pub fn new(text: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            text,
            start_offset,
            end_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Common trait for chunking strategies.
pub trait Chunker: Send + Sync {
    /// Chunk the given text into an ordered list of chunks.
    fn chunk(&self, text: &str) -> Vec<TextChunk>;

    /// The configuration used by this chunker.
    fn config(&self) -> &ChunkerConfig;
}

/// Find a UTF-8 safe boundary at or before the given position.
fn find_char_boundary_before(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Find a UTF-8 safe boundary at or after the given position.
fn find_char_boundary_after(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Splits text at paragraph boundaries (one or more blank lines).
///
/// Adjacent paragraphs smaller than `min_chunk_size` are merged while the
/// result stays under `max_chunk_size`; paragraphs larger than
/// `max_chunk_size` are windowed with a [`SlidingWindowChunker`].
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    config: ChunkerConfig,
}

impl ParagraphChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split text into (start, end, text) paragraph spans.
    fn split_paragraphs<'a>(&self, text: &'a str) -> Vec<(usize, usize, &'a str)> {
        let boundary = Regex::new(r"\n[ \t]*\n+").unwrap();

        let mut spans = Vec::new();
        let mut last = 0;
        for m in boundary.find_iter(text) {
            if m.start() > last {
                spans.push((last, m.start(), &text[last..m.start()]));
            }
            last = m.end();
        }
        if last < text.len() {
            spans.push((last, text.len(), &text[last..]));
        }

        spans
            .into_iter()
            .filter(|(_, _, para)| !para.trim().is_empty())
            .collect()
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks: Vec<TextChunk> = Vec::new();

        for (start, end, para) in self.split_paragraphs(text) {
            if para.len() > self.config.max_chunk_size {
                // Oversized paragraph: window it and rebase offsets.
                let window = SlidingWindowChunker::new(self.config.clone());
                for sub in window.chunk(para) {
                    chunks.push(TextChunk::new(
                        sub.text,
                        start + sub.start_offset,
                        start + sub.end_offset,
                    ));
                }
                continue;
            }

            // Merge a small paragraph into the previous chunk when the
            // combined size stays within bounds.
            if let Some(prev) = chunks.last_mut() {
                let combined = end - prev.start_offset;
                if prev.len() < self.config.min_chunk_size && combined <= self.config.max_chunk_size
                {
                    prev.text = text[prev.start_offset..end].to_string();
                    prev.end_offset = end;
                    continue;
                }
            }

            chunks.push(TextChunk::new(para.to_string(), start, end));
        }

        chunks
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

/// Fixed-size chunks with configurable overlap.
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    config: ChunkerConfig,
}

impl SlidingWindowChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return vec![];
        }

        if text.len() <= self.config.max_chunk_size {
            return vec![TextChunk::new(text.to_string(), 0, text.len())];
        }

        // Overlap >= window would never advance.
        let step = self
            .config
            .max_chunk_size
            .saturating_sub(self.config.overlap)
            .max(1);

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let mut end = (start + self.config.max_chunk_size).min(text.len());
            end = find_char_boundary_before(text, end);

            if end > start {
                chunks.push(TextChunk::new(text[start..end].to_string(), start, end));
            }

            if end >= text.len() {
                break;
            }

            start = find_char_boundary_after(text, start + step);
        }

        chunks
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, min: usize, overlap: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_chunk_size: max,
            min_chunk_size: min,
            overlap,
        }
    }

    #[test]
    fn test_paragraph_chunker_empty_text() {
        let chunker = ParagraphChunker::new(ChunkerConfig::default());
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_paragraph_chunker_single_paragraph() {
        let chunker = ParagraphChunker::new(ChunkerConfig::default());
        let chunks = chunker.chunk("Just one paragraph of text.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just one paragraph of text.");
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn test_paragraph_chunker_splits_on_blank_lines() {
        let chunker = ParagraphChunker::new(config(100, 1, 0));
        let text = "First paragraph here.\n\nSecond paragraph here.\n\n\nThird one.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "First paragraph here.");
        assert_eq!(chunks[1].text, "Second paragraph here.");
        assert_eq!(chunks[2].text, "Third one.");
    }

    #[test]
    fn test_paragraph_chunker_offsets_match_source() {
        let chunker = ParagraphChunker::new(config(100, 1, 0));
        let text = "Alpha beta.\n\nGamma delta.";
        let chunks = chunker.chunk(text);
        for chunk in &chunks {
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
        }
    }

    #[test]
    fn test_paragraph_chunker_merges_small_paragraphs() {
        let chunker = ParagraphChunker::new(config(200, 30, 0));
        let text = "Tiny.\n\nAlso tiny.\n\nStill small.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, text.len());
    }

    #[test]
    fn test_paragraph_chunker_windows_oversized_paragraph() {
        let chunker = ParagraphChunker::new(config(20, 1, 5));
        let text = "a".repeat(50);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 20);
        }
    }

    #[test]
    fn test_sliding_window_empty() {
        let chunker = SlidingWindowChunker::new(ChunkerConfig::default());
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn test_sliding_window_short_text_single_chunk() {
        let chunker = SlidingWindowChunker::new(config(100, 1, 10));
        let chunks = chunker.chunk("short");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
    }

    #[test]
    fn test_sliding_window_overlap() {
        let chunker = SlidingWindowChunker::new(config(10, 1, 4));
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() > 1);
        // Step is max - overlap = 6.
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[1].start_offset, 6);
        // Adjacent chunks share the overlap region.
        assert_eq!(&chunks[0].text[6..], &chunks[1].text[..4]);
    }

    #[test]
    fn test_sliding_window_overlap_equal_to_size_still_terminates() {
        let chunker = SlidingWindowChunker::new(config(5, 1, 5));
        let text = "abcdefghij";
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= text.len());
    }

    #[test]
    fn test_sliding_window_utf8_boundaries() {
        let chunker = SlidingWindowChunker::new(config(7, 1, 2));
        // Multibyte characters must never be split.
        let text = "héllo wörld ünïcode tëxt hërë";
        let chunks = chunker.chunk(text);
        for chunk in &chunks {
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
        }
    }

    #[test]
    fn test_chunkers_cover_all_content() {
        let chunker = ParagraphChunker::new(config(40, 5, 0));
        let text = "One paragraph.\n\nTwo paragraph.\n\nThree paragraph with more words in it.";
        let chunks = chunker.chunk(text);
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect::<String>();
        // No paragraph content is lost (separators aside).
        assert!(rejoined.contains("One paragraph."));
        assert!(rejoined.contains("Three paragraph with more words in it."));
    }
}
