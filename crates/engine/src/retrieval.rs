//! Vector retrieval and paper-level aggregation
//!
//! Wraps the vector index, converts distances to similarities, and groups
//! chunk-level hits into paper-level candidates. A paper's score is the
//! maximum similarity among its hits: one highly relevant passage should
//! surface the paper even when its other chunks are noise.

use biorag_common::backends::{ChunkHit, ChunkMetadata, IndexFilter, VectorIndex};
use biorag_common::errors::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Maximum excerpt snippets retained per paper for display
const MAX_EXCERPTS: usize = 3;

/// Maximum excerpt length in characters
const EXCERPT_CHARS: usize = 200;

/// A chunk-level hit with distance converted to similarity
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    /// Chunk text
    pub text: String,

    /// Similarity score (1 - cosine distance)
    pub similarity: f32,

    /// Chunk metadata
    pub metadata: ChunkMetadata,
}

impl From<ChunkHit> for ChunkMatch {
    fn from(hit: ChunkHit) -> Self {
        Self {
            text: hit.text,
            similarity: 1.0 - hit.distance,
            metadata: hit.metadata,
        }
    }
}

/// Transient paper-level aggregation of chunk hits. Built per query, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Paper identifier (PMID)
    pub paper_id: String,

    /// Paper title
    pub title: String,

    /// Journal name, when known
    pub journal: Option<String>,

    /// Best chunk similarity observed for this paper
    pub best_score: f32,

    /// Text of the highest-scoring chunk (reranker input)
    pub best_chunk_text: String,

    /// Up to 3 excerpt snippets in hit-arrival order, for display
    pub matched_excerpts: Vec<String>,

    /// Publication date, when known
    pub publication_date: Option<NaiveDate>,

    /// Citation count
    pub citation_count: i64,
}

/// A candidate after filtering/sorting/reranking. `relevance_score` is on
/// the scoring model's own scale: cosine similarity before reranking, the
/// cross-encoder's unbounded scale after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub paper_id: String,
    pub title: String,
    pub journal: Option<String>,
    pub relevance_score: f32,
    pub publication_date: Option<NaiveDate>,
    pub citation_count: i64,
    pub matched_excerpts: Vec<String>,
}

impl From<SearchCandidate> for RankedResult {
    fn from(candidate: SearchCandidate) -> Self {
        Self {
            paper_id: candidate.paper_id,
            title: candidate.title,
            journal: candidate.journal,
            relevance_score: candidate.best_score,
            publication_date: candidate.publication_date,
            citation_count: candidate.citation_count,
            matched_excerpts: candidate.matched_excerpts,
        }
    }
}

/// Vector-search wrapper with chunk oversampling
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    oversample_factor: usize,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, oversample_factor: usize) -> Self {
        Self {
            index,
            oversample_factor: oversample_factor.max(1),
        }
    }

    /// Retrieve chunk hits for a query embedding.
    ///
    /// Requests `top_k * oversample_factor` hits so that paper aggregation
    /// and reranking still have `top_k` distinct papers to work with.
    pub async fn search_chunks(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<ChunkMatch>> {
        let started = Instant::now();
        let hits = self
            .index
            .query(query_embedding, top_k * self.oversample_factor, filter)
            .await?;

        metrics::histogram!(biorag_common::metrics::RETRIEVAL_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        Ok(hits.into_iter().map(ChunkMatch::from).collect())
    }

    /// Retrieve exactly `top_k` chunk hits, without oversampling
    pub async fn search_chunks_exact(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<ChunkMatch>> {
        let hits = self.index.query(query_embedding, top_k, filter).await?;
        Ok(hits.into_iter().map(ChunkMatch::from).collect())
    }

    /// All chunks for one paper, unscored. Used to build an aggregate paper
    /// embedding for content recommendations.
    pub async fn paper_chunks(&self, pmid: &str) -> Result<Vec<ChunkMatch>> {
        let hits = self.index.fetch_by_paper(pmid).await?;
        Ok(hits.into_iter().map(ChunkMatch::from).collect())
    }
}

/// Group chunk hits by paper, keeping the maximum similarity per paper.
///
/// Pure and idempotent: the same hit set always yields the same candidates.
/// Output is sorted by score descending with paper id as tie-break.
pub fn aggregate_by_paper(hits: &[ChunkMatch]) -> Vec<SearchCandidate> {
    let mut papers: HashMap<&str, SearchCandidate> = HashMap::new();
    let mut arrival: Vec<&str> = Vec::new();

    for hit in hits {
        let pmid = hit.metadata.pmid.as_str();
        if pmid.is_empty() {
            continue;
        }

        match papers.get_mut(pmid) {
            Some(candidate) => {
                if hit.similarity > candidate.best_score {
                    candidate.best_score = hit.similarity;
                    candidate.best_chunk_text = hit.text.clone();
                }
                if candidate.matched_excerpts.len() < MAX_EXCERPTS {
                    candidate
                        .matched_excerpts
                        .push(truncate_chars(&hit.text, EXCERPT_CHARS));
                }
            }
            None => {
                arrival.push(pmid);
                papers.insert(
                    pmid,
                    SearchCandidate {
                        paper_id: hit.metadata.pmid.clone(),
                        title: hit.metadata.title.clone(),
                        journal: hit.metadata.journal.clone(),
                        best_score: hit.similarity,
                        best_chunk_text: hit.text.clone(),
                        matched_excerpts: vec![truncate_chars(&hit.text, EXCERPT_CHARS)],
                        publication_date: hit.metadata.publication_date,
                        citation_count: hit.metadata.citation_count,
                    },
                );
            }
        }
    }

    let mut candidates: Vec<SearchCandidate> = arrival
        .into_iter()
        .filter_map(|pmid| papers.remove(pmid))
        .collect();

    sort_candidates(&mut candidates);
    candidates
}

/// Sort candidates by score descending, breaking ties by paper id for
/// deterministic ordering.
pub fn sort_candidates(candidates: &mut [SearchCandidate]) {
    candidates.sort_by(|a, b| {
        b.best_score
            .partial_cmp(&a.best_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.paper_id.cmp(&b.paper_id))
    });
}

/// Truncate to at most `max_chars` characters, respecting char boundaries
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(pmid: &str, similarity: f32, text: &str) -> ChunkMatch {
        ChunkMatch {
            text: text.to_string(),
            similarity,
            metadata: ChunkMetadata {
                pmid: pmid.to_string(),
                title: format!("Paper {}", pmid),
                section: "abstract".to_string(),
                chunk_index: 0,
                token_count: 100,
                journal: Some("Nature".to_string()),
                publication_date: None,
                citation_count: 10,
            },
        }
    }

    #[test]
    fn test_max_score_rule() {
        // Two chunks for P1 (0.6, 0.9), one for P2 (0.8) -> P1 first at 0.9
        let hits = vec![
            hit("P1", 0.6, "p1 low"),
            hit("P2", 0.8, "p2"),
            hit("P1", 0.9, "p1 high"),
        ];

        let candidates = aggregate_by_paper(&hits);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].paper_id, "P1");
        assert!((candidates[0].best_score - 0.9).abs() < 1e-6);
        assert_eq!(candidates[0].best_chunk_text, "p1 high");
        assert_eq!(candidates[1].paper_id, "P2");
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let hits = vec![
            hit("P1", 0.6, "a"),
            hit("P2", 0.8, "b"),
            hit("P1", 0.9, "c"),
        ];

        let first = aggregate_by_paper(&hits);
        let second = aggregate_by_paper(&hits);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.paper_id, b.paper_id);
            assert_eq!(a.best_score, b.best_score);
            assert_eq!(a.matched_excerpts, b.matched_excerpts);
        }
    }

    #[test]
    fn test_excerpts_capped_and_in_arrival_order() {
        let hits = vec![
            hit("P1", 0.9, "first"),
            hit("P1", 0.5, "second"),
            hit("P1", 0.4, "third"),
            hit("P1", 0.3, "fourth"),
        ];

        let candidates = aggregate_by_paper(&hits);
        assert_eq!(candidates[0].matched_excerpts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_excerpt_truncated_to_200_chars() {
        let long = "x".repeat(500);
        let hits = vec![hit("P1", 0.9, &long)];

        let candidates = aggregate_by_paper(&hits);
        assert_eq!(candidates[0].matched_excerpts[0].chars().count(), 200);
        // Full text kept for reranking
        assert_eq!(candidates[0].best_chunk_text.len(), 500);
    }

    #[test]
    fn test_empty_pmid_skipped() {
        let hits = vec![hit("", 0.9, "orphan"), hit("P1", 0.5, "ok")];
        let candidates = aggregate_by_paper(&hits);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].paper_id, "P1");
    }

    #[test]
    fn test_tie_broken_by_paper_id() {
        let hits = vec![hit("B", 0.8, "b"), hit("A", 0.8, "a")];
        let candidates = aggregate_by_paper(&hits);
        assert_eq!(candidates[0].paper_id, "A");
        assert_eq!(candidates[1].paper_id, "B");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "αβγδε";
        assert_eq!(truncate_chars(text, 3), "αβγ");
    }
}
