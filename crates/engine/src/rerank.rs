//! Cross-encoder reranking
//!
//! Rescores an already-filtered candidate list with a query/passage
//! cross-encoder. Reranking reorders and rescores; it never adds or
//! removes candidates. Scores come back on the model's own scale, which
//! is unbounded and not comparable to cosine similarity.

use crate::retrieval::{ChunkMatch, SearchCandidate};
use biorag_common::backends::RerankBackend;
use biorag_common::errors::Result;
use std::sync::Arc;

/// Candidate reranker over a cross-encoder backend
pub struct RerankAdapter {
    backend: Arc<dyn RerankBackend>,
}

impl RerankAdapter {
    pub fn new(backend: Arc<dyn RerankBackend>) -> Self {
        Self { backend }
    }

    /// Rescore paper candidates against the query.
    ///
    /// Each candidate is represented by its title plus best chunk text.
    /// Zero or one candidate short-circuits without touching the backend.
    pub async fn rerank_papers(
        &self,
        query: &str,
        mut candidates: Vec<SearchCandidate>,
    ) -> Result<Vec<SearchCandidate>> {
        if candidates.len() <= 1 {
            return Ok(candidates);
        }

        let passages: Vec<String> = candidates
            .iter()
            .map(|c| format!("{} {}", c.title, c.best_chunk_text))
            .collect();

        let scores = self.backend.score(query, &passages).await?;

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.best_score = score;
        }
        candidates.sort_by(|a, b| {
            b.best_score
                .partial_cmp(&a.best_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.paper_id.cmp(&b.paper_id))
        });

        tracing::debug!(count = candidates.len(), "Candidates reranked");
        Ok(candidates)
    }

    /// Rescore raw chunk hits against the query, for answer-context
    /// selection.
    pub async fn rerank_chunks(
        &self,
        query: &str,
        mut chunks: Vec<ChunkMatch>,
    ) -> Result<Vec<ChunkMatch>> {
        if chunks.len() <= 1 {
            return Ok(chunks);
        }

        let passages: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let scores = self.backend.score(query, &passages).await?;

        for (chunk, score) in chunks.iter_mut().zip(scores) {
            chunk.similarity = score;
        }
        chunks.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.metadata.pmid.cmp(&b.metadata.pmid))
                .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });

        Ok(chunks)
    }
}
