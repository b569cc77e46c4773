//! External backend contracts
//!
//! The engine treats the embedding model, vector index, cross-encoder
//! reranker, generative model, and relational paper store as external
//! collaborators with fixed contracts. Each is an explicitly constructed,
//! dependency-injected `Arc<dyn …>` handle.
//!
//! Concurrency contract: every trait here is `Send + Sync` and may be called
//! from many in-flight requests at once. An implementation wrapping a
//! resource that is not safe for concurrent inference must serialize access
//! internally; see [`SerialReranker`] for the provided wrapper.

mod embedding;
mod llm;
mod reranker;
mod store;
mod vector;

pub use embedding::{l2_normalize, HttpEmbedder, MockEmbedder};
pub use llm::ChatClient;
pub use reranker::{HttpReranker, SerialReranker};
pub use store::{CitationEdge, InMemoryPaperStore, PaperRecord};
pub use vector::InMemoryVectorIndex;

use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use uuid::Uuid;

/// Incremental text fragments from a streaming generation call
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode a single text into a fixed-dimension vector
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode multiple texts (batch)
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Trait for pairwise relevance scoring (cross-encoder style)
#[async_trait]
pub trait RerankBackend: Send + Sync {
    /// Score each passage against the query.
    ///
    /// Returns one score per passage, in input order. Scores are on the
    /// cross-encoder's own scale and are not bounded to [0, 1].
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// Trait for the generative language model
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Generate a completion for the given system/user prompts
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;

    /// Streaming variant yielding incremental text fragments
    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<TextStream>;
}

/// Per-chunk metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Paper identifier (PMID)
    pub pmid: String,

    /// Paper title
    pub title: String,

    /// Section label ("abstract", "body_0", "methods_1", ...)
    pub section: String,

    /// Chunk position within the paper
    pub chunk_index: usize,

    /// Token count of the chunk text
    pub token_count: usize,

    /// Journal name, when known
    pub journal: Option<String>,

    /// Publication date, when known
    pub publication_date: Option<NaiveDate>,

    /// Citation count at indexing time
    pub citation_count: i64,
}

/// A chunk plus its embedding, ready for indexing
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Chunk ID
    pub id: Uuid,

    /// Embedding vector
    pub embedding: Vec<f32>,

    /// Chunk text
    pub text: String,

    /// Chunk metadata
    pub metadata: ChunkMetadata,
}

/// A chunk-level hit returned by the vector index
#[derive(Debug, Clone)]
pub struct ChunkHit {
    /// Chunk ID
    pub id: Uuid,

    /// Chunk text
    pub text: String,

    /// Cosine distance from the query vector (similarity = 1 - distance)
    pub distance: f32,

    /// Chunk metadata
    pub metadata: ChunkMetadata,
}

/// Metadata predicate pushed down to the vector index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFilter {
    /// Restrict hits to a section label
    pub section: Option<String>,
}

impl IndexFilter {
    fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match &self.section {
            Some(section) => metadata.section == *section,
            None => true,
        }
    }
}

/// Trait for the backing vector index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace chunks
    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Query the `top_k` nearest chunks, optionally filtered by metadata
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<ChunkHit>>;

    /// Fetch all chunks for a paper, unscored (distance 0)
    async fn fetch_by_paper(&self, pmid: &str) -> Result<Vec<ChunkHit>>;

    /// Delete all chunks for a paper, returning the number removed
    async fn delete_by_paper(&self, pmid: &str) -> Result<usize>;
}

/// Read-only view of the relational paper store
///
/// Edge lookups are batched: one round trip returns the edges for a whole
/// hop, rather than one query per cited/citing paper.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Look up a single paper
    async fn get_paper(&self, pmid: &str) -> Result<Option<PaperRecord>>;

    /// Batched paper lookup; missing ids are simply absent from the map
    async fn get_papers(&self, pmids: &[String]) -> Result<HashMap<String, PaperRecord>>;

    /// Papers cited by `pmid` (outgoing edges)
    async fn references_of(&self, pmid: &str) -> Result<Vec<String>>;

    /// Papers citing `pmid` (incoming edges)
    async fn citers_of(&self, pmid: &str) -> Result<Vec<String>>;

    /// Batched incoming-edge lookup for many papers at once
    async fn citers_of_many(&self, pmids: &[String]) -> Result<HashMap<String, Vec<String>>>;

    /// Batched outgoing-edge lookup for many papers at once
    async fn references_of_many(&self, pmids: &[String]) -> Result<HashMap<String, Vec<String>>>;

    /// Papers published on or after the cutoff date
    async fn published_since(&self, cutoff: NaiveDate) -> Result<Vec<PaperRecord>>;
}
