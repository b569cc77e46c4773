//! Paper chunking
//!
//! Splits paper text into bounded-length retrieval units. The abstract is
//! always emitted whole as chunk 0; full text is cut into sliding token
//! windows with overlap; undersized windows are dropped.
//!
//! Tokens here are whitespace-separated words. The embedding backend owns
//! real subword tokenization; window arithmetic only needs a stable,
//! deterministic unit.

use biorag_common::config::ChunkingConfig;
use biorag_common::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded-length span of a paper's text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk ID
    pub id: Uuid,

    /// Paper identifier (PMID)
    pub paper_id: String,

    /// Paper title (carried for index metadata)
    pub title: String,

    /// Section label ("abstract", "body_0", "methods_1", ...)
    pub section: String,

    /// Chunk text
    pub text: String,

    /// Position within the paper, assigned in emission order from 0
    pub chunk_index: usize,

    /// Token count of the chunk text
    pub token_count: usize,
}

/// Sliding-window chunker
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_tokens: usize,
}

impl Chunker {
    /// Create a chunker; the window step (`chunk_size - chunk_overlap`) must
    /// be positive.
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.chunk_overlap >= config.chunk_size {
            return Err(EngineError::Configuration {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    config.chunk_overlap, config.chunk_size
                ),
            });
        }
        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_tokens: config.min_chunk_tokens,
        })
    }

    /// Create chunks for a paper.
    ///
    /// The abstract, when present, is always chunk 0 with section
    /// `"abstract"`, untruncated regardless of length. Full-text windows
    /// follow as `body_{i}`. With neither abstract nor full text the result
    /// is empty: nothing to index, not an error.
    pub fn chunk_paper(
        &self,
        pmid: &str,
        title: &str,
        abstract_text: Option<&str>,
        full_text: Option<&str>,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        if let Some(abstract_text) = abstract_text.filter(|t| !t.trim().is_empty()) {
            chunks.push(Chunk {
                id: Uuid::new_v4(),
                paper_id: pmid.to_string(),
                title: title.to_string(),
                section: "abstract".to_string(),
                text: abstract_text.to_string(),
                chunk_index: 0,
                token_count: token_count(abstract_text),
            });
        }

        if let Some(full_text) = full_text {
            for (i, (text, tokens)) in self.windows(full_text).into_iter().enumerate() {
                chunks.push(Chunk {
                    id: Uuid::new_v4(),
                    paper_id: pmid.to_string(),
                    title: title.to_string(),
                    section: format!("body_{}", i),
                    text,
                    chunk_index: chunks.len(),
                    token_count: tokens,
                });
            }
        }

        tracing::debug!(pmid, chunk_count = chunks.len(), "Paper chunked");
        chunks
    }

    /// Section-aware chunking. Sections longer than the window size are
    /// sub-chunked as `"{section}_{i}"`; shorter sections are kept whole.
    pub fn chunk_sections(
        &self,
        pmid: &str,
        title: &str,
        sections: &[(String, String)],
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (section_name, section_text) in sections {
            let tokens = token_count(section_text);

            if tokens > self.chunk_size {
                for (i, (text, sub_tokens)) in self.windows(section_text).into_iter().enumerate() {
                    chunks.push(Chunk {
                        id: Uuid::new_v4(),
                        paper_id: pmid.to_string(),
                        title: title.to_string(),
                        section: format!("{}_{}", section_name, i),
                        text,
                        chunk_index: chunks.len(),
                        token_count: sub_tokens,
                    });
                }
            } else {
                chunks.push(Chunk {
                    id: Uuid::new_v4(),
                    paper_id: pmid.to_string(),
                    title: title.to_string(),
                    section: section_name.clone(),
                    text: section_text.clone(),
                    chunk_index: chunks.len(),
                    token_count: tokens,
                });
            }
        }

        chunks
    }

    /// Cut text into sliding windows of `chunk_size` tokens, stepping by
    /// `chunk_size - chunk_overlap`. Windows under the minimum token floor
    /// are dropped.
    fn windows(&self, text: &str) -> Vec<(String, usize)> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut windows = Vec::new();

        let mut start = 0;
        while start < tokens.len() {
            let end = (start + self.chunk_size).min(tokens.len());
            let window = &tokens[start..end];

            if window.len() >= self.min_tokens {
                windows.push((window.join(" "), window.len()));
            }

            start += step;
        }

        windows
    }
}

/// Whitespace token count
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
