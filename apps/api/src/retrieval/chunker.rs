use serde::{Deserialize, Serialize};

use crate::retrieval::loader::Page;

/// A bounded-length slice of page text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the document-wide chunk sequence.
    pub id: usize,
    pub page: usize,
    pub text: String,
}

/// Fixed-size character splitter with overlap between neighbouring chunks.
/// Sizes are counted in `char`s so multi-byte text never splits mid-codepoint.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    /// Chunks every page in order; ids run across pages.
    pub fn split_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for text in self.split_text(&page.text) {
                chunks.push(Chunk {
                    id: chunks.len(),
                    page: page.number,
                    text,
                });
            }
        }
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut segments = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            segments.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        segments
    }
}
