use sha2::{Digest, Sha256};

use super::store::Chunk;
use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::ReviewRecord;

/// Splits review text into overlapping windows of at most `max_chars`
/// characters. Cuts prefer a paragraph break, then a sentence end, then
/// whitespace, searched in the back half of each window. Every chunk after
/// the first starts exactly `overlap_chars` characters before the end of
/// its predecessor.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    Whitespace,
    Sentence,
    Paragraph,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            overlap_chars: overlap_chars.min(max_chars - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Chunk a review. Malformed records are rejected before any work.
    pub fn chunk(&self, record: &ReviewRecord) -> Result<Vec<Chunk>> {
        record.validate()?;
        Ok(self.chunk_text(&record.record_id(), &record.page_content()))
    }

    pub fn chunk_text(&self, record_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let window_end = (start + self.max_chars).min(chars.len());
            let end = if window_end == chars.len() {
                window_end
            } else {
                self.find_cut(&chars, start, window_end)
            };

            let chunk_text: String = chars[start..end].iter().collect();
            chunks.push(Chunk {
                id: format!("{}:{}", record_id, chunks.len()),
                record_id: record_id.to_string(),
                index: chunks.len(),
                hash: hash_content(&chunk_text),
                text: chunk_text,
                start_char: start,
                end_char: end,
            });

            if end >= chars.len() {
                break;
            }
            // find_cut guarantees end > start + overlap, so this advances
            start = end - self.overlap_chars;
        }

        chunks
    }

    /// Best cut in `(lower, window_end]`, or a hard cut at `window_end`.
    fn find_cut(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let lower = start + (self.overlap_chars + 1).max(self.max_chars / 2);
        if lower >= window_end {
            return window_end;
        }

        let mut best: Option<(Boundary, usize)> = None;
        for end in (lower + 1..=window_end).rev() {
            let Some(kind) = boundary_before(chars, end) else {
                continue;
            };
            // Scanning backwards: keep the rightmost cut of the strongest kind
            if best.map_or(true, |(k, _)| kind > k) {
                best = Some((kind, end));
                if kind == Boundary::Paragraph {
                    break;
                }
            }
        }

        best.map_or(window_end, |(_, end)| end)
    }
}

/// Classify a cut placed just before `chars[end]`.
fn boundary_before(chars: &[char], end: usize) -> Option<Boundary> {
    let prev = chars[end - 1];
    let next = chars.get(end).copied();

    if prev == '\n' && end >= 2 && chars[end - 2] == '\n' {
        return Some(Boundary::Paragraph);
    }
    if matches!(prev, '.' | '!' | '?') && next.map_or(true, char::is_whitespace) {
        return Some(Boundary::Sentence);
    }
    if prev.is_whitespace() {
        return Some(Boundary::Whitespace);
    }
    None
}

/// Truncated SHA-256 of chunk text, used to skip unchanged re-ingestion.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    fn review(text: &str) -> ReviewRecord {
        ReviewRecord {
            product_id: Some("B00TEST".to_string()),
            user_id: "U1".to_string(),
            text: text.to_string(),
            rating: 4.0,
            timestamp: 1,
            ..Default::default()
        }
    }

    fn long_text() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("Sentence number {} talks about the battery. ", i));
            if i % 7 == 6 {
                text.push_str("\n\n");
            }
        }
        text
    }

    #[test]
    fn test_short_text_yields_single_chunk() {
        let chunker = Chunker::new(100, 20);
        let chunks = chunker.chunk(&review("Short and sweet.")).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Short and sweet.");
        assert_eq!(chunks[0].index, 0);
        assert!(chunks[0].id.ends_with(":0"));
    }

    #[test]
    fn test_chunks_respect_max_size_and_overlap() {
        let chunker = Chunker::new(200, 40);
        let text = long_text();
        let chunks = chunker.chunk_text("rec", &text);
        let chars: Vec<char> = text.chars().collect();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 200);
            let expected: String = chars[chunk.start_char..chunk.end_char].iter().collect();
            assert_eq!(chunk.text, expected);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_char - pair[1].start_char, 40);
        }
        assert_eq!(chunks.last().unwrap().end_char, chars.len());
    }

    #[test]
    fn test_prefers_semantic_boundaries() {
        let chunker = Chunker::new(120, 10);
        let text = "First paragraph talks about the battery and how long it lasts on a single charge.\n\nSecond paragraph follows with more words to push past the limit of the window size.";
        let chunks = chunker.chunk_text("rec", text);

        assert!(chunks.len() > 1);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = Chunker::new(150, 30);
        let record = review(&long_text());

        let first = chunker.chunk(&record).unwrap();
        let second = chunker.chunk(&record).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let chunker = Chunker::new(10, 3);
        let text = "a".repeat(25);
        let chunks = chunker.chunk_text("rec", &text);

        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(chunks[0].end_char, 10);
        assert_eq!(chunks[1].start_char, 7);
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let chunker = Chunker::new(8, 2);
        let chunks = chunker.chunk_text("rec", "電池の持ちがとても良いです。満足しています。");

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 8));
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        let chunker = Chunker::default();
        let err = chunker.chunk(&review("   ")).unwrap_err();
        assert!(matches!(err, RagError::Malformed(_)));
    }

    #[test]
    fn test_overlap_is_clamped_below_size() {
        let chunker = Chunker::new(10, 50);
        assert_eq!(chunker.overlap_chars(), 9);
        let chunks = chunker.chunk_text("rec", &"x".repeat(30));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_hash_content() {
        let hash1 = hash_content("hello");
        let hash2 = hash_content("hello");
        let hash3 = hash_content("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16);
    }
}
