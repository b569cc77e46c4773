//! Paper recommendation
//!
//! Three signals, one surface: content similarity over an aggregate paper
//! embedding, citation-graph proximity (bibliographic coupling and
//! co-citation), and a weighted hybrid of the two. Trending is a separate
//! recency-window ranking by citation count.

use crate::retrieval::{aggregate_by_paper, ChunkMatch, Retriever};
use biorag_common::backends::{Embedder, PaperStore, VectorIndex};
use biorag_common::config::RecommendConfig;
use biorag_common::errors::{EngineError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Score a paper earns for citing the same references as the seed
/// (bibliographic coupling)
const COUPLING_WEIGHT: f32 = 1.0;

/// Score a paper earns for being cited alongside the seed (co-citation)
const CO_CITATION_WEIGHT: f32 = 0.5;

/// Which signal produced a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendMethod {
    Content,
    Citation,
    Hybrid,
    Trending,
}

/// A recommended paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationScore {
    /// Paper identifier (PMID)
    pub paper_id: String,

    /// Paper title
    pub title: String,

    /// Recommendation score; scale depends on the method
    pub score: f32,

    /// Journal name, when known
    pub journal: Option<String>,

    /// Citation count
    pub citation_count: i64,

    /// Signal that produced this recommendation
    pub method: RecommendMethod,
}

/// Paper recommender over the vector index and citation graph
pub struct Recommender {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    retriever: Arc<Retriever>,
    store: Arc<dyn PaperStore>,
    content_weight: f32,
    oversample_factor: usize,
    trending_days: i64,
}

impl Recommender {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn PaperStore>,
        config: &RecommendConfig,
    ) -> Self {
        let retriever = Arc::new(Retriever::new(index.clone(), config.oversample_factor));
        Self {
            embedder,
            index,
            retriever,
            store,
            content_weight: config.content_weight.clamp(0.0, 1.0),
            oversample_factor: config.oversample_factor.max(1),
            trending_days: config.trending_days,
        }
    }

    /// Recommend by content similarity.
    ///
    /// The seed paper is represented by the mean of its chunk embeddings;
    /// nearest chunks are aggregated to papers and the seed itself is
    /// excluded. A seed with no indexed chunks yields an empty result so the
    /// citation signal can still carry a hybrid request.
    pub async fn by_content(&self, pmid: &str, top_k: usize) -> Result<Vec<RecommendationScore>> {
        let chunks = self.retriever.paper_chunks(pmid).await?;
        if chunks.is_empty() {
            metrics::counter!(biorag_common::metrics::RECOMMENDATIONS_TOTAL).increment(1);
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.encode_batch(&texts).await?;
        let centroid = mean_embedding(&embeddings).ok_or_else(|| EngineError::EmbeddingBackend {
            message: "embedding batch came back empty".to_string(),
        })?;

        let hits = self
            .index
            .query(&centroid, top_k * self.oversample_factor, None)
            .await?;
        let matches: Vec<ChunkMatch> = hits.into_iter().map(ChunkMatch::from).collect();

        let mut recommendations: Vec<RecommendationScore> = aggregate_by_paper(&matches)
            .into_iter()
            .filter(|c| c.paper_id != pmid)
            .map(|c| RecommendationScore {
                paper_id: c.paper_id,
                title: c.title,
                score: c.best_score,
                journal: c.journal,
                citation_count: c.citation_count,
                method: RecommendMethod::Content,
            })
            .collect();
        recommendations.truncate(top_k);

        metrics::counter!(biorag_common::metrics::RECOMMENDATIONS_TOTAL).increment(1);
        Ok(recommendations)
    }

    /// Recommend by citation-graph proximity.
    ///
    /// Papers citing the same references as the seed earn 1.0 per shared
    /// reference; papers cited alongside the seed earn 0.5 per shared
    /// citer. Scores are normalized by the maximum. Both edge hops run as
    /// single batched lookups. A seed with no edges yields an empty result.
    pub async fn by_citation(&self, pmid: &str, top_k: usize) -> Result<Vec<RecommendationScore>> {
        let references = self.store.references_of(pmid).await?;
        let citers = self.store.citers_of(pmid).await?;

        let mut scores: HashMap<String, f32> = HashMap::new();

        // Bibliographic coupling: who else cites what the seed cites
        let coupled = self.store.citers_of_many(&references).await?;
        for citing in coupled.values().flatten() {
            *scores.entry(citing.clone()).or_insert(0.0) += COUPLING_WEIGHT;
        }

        // Co-citation: what else the seed's citers cite
        let co_cited = self.store.references_of_many(&citers).await?;
        for cited in co_cited.values().flatten() {
            *scores.entry(cited.clone()).or_insert(0.0) += CO_CITATION_WEIGHT;
        }

        scores.remove(pmid);
        if scores.is_empty() {
            metrics::counter!(biorag_common::metrics::RECOMMENDATIONS_TOTAL).increment(1);
            return Ok(Vec::new());
        }

        let max_score = scores.values().cloned().fold(f32::MIN, f32::max);
        let candidate_ids: Vec<String> = scores.keys().cloned().collect();
        let papers = self.store.get_papers(&candidate_ids).await?;

        // Papers absent from the store are dropped rather than surfaced
        // half-populated.
        let mut recommendations: Vec<RecommendationScore> = scores
            .into_iter()
            .filter_map(|(candidate, score)| {
                papers.get(&candidate).map(|paper| RecommendationScore {
                    paper_id: candidate,
                    title: paper.title.clone(),
                    score: score / max_score,
                    journal: paper.journal.clone(),
                    citation_count: paper.citation_count,
                    method: RecommendMethod::Citation,
                })
            })
            .collect();

        sort_recommendations(&mut recommendations);
        recommendations.truncate(top_k);

        metrics::counter!(biorag_common::metrics::RECOMMENDATIONS_TOTAL).increment(1);
        Ok(recommendations)
    }

    /// Weighted blend of content and citation signals.
    ///
    /// Each signal is normalized to [0, 1] by its own maximum before
    /// blending, so the weights compare like with like. A paper present in
    /// only one signal keeps that signal's weighted score.
    pub async fn hybrid(&self, pmid: &str, top_k: usize) -> Result<Vec<RecommendationScore>> {
        let content = self.by_content(pmid, top_k * 2).await?;
        let citation = self.by_citation(pmid, top_k * 2).await?;

        let content_scores = normalize_scores(&content);
        let citation_scores = normalize_scores(&citation);

        let info: HashMap<&str, &RecommendationScore> = citation
            .iter()
            .chain(content.iter())
            .map(|r| (r.paper_id.as_str(), r))
            .collect();

        let merged = merge_scores(&content_scores, &citation_scores, self.content_weight);

        let mut recommendations: Vec<RecommendationScore> = merged
            .into_iter()
            .filter_map(|(candidate, score)| {
                info.get(candidate.as_str()).map(|r| RecommendationScore {
                    paper_id: candidate,
                    title: r.title.clone(),
                    score,
                    journal: r.journal.clone(),
                    citation_count: r.citation_count,
                    method: RecommendMethod::Hybrid,
                })
            })
            .collect();

        sort_recommendations(&mut recommendations);
        recommendations.truncate(top_k);
        Ok(recommendations)
    }

    /// Most-cited papers published inside the trending window.
    pub async fn trending(&self, top_k: usize) -> Result<Vec<RecommendationScore>> {
        let cutoff = (Utc::now() - chrono::Duration::days(self.trending_days)).date_naive();
        let recent = self.store.published_since(cutoff).await?;

        let mut recommendations: Vec<RecommendationScore> = recent
            .into_iter()
            .map(|paper| RecommendationScore {
                paper_id: paper.pmid,
                title: paper.title,
                score: paper.citation_count as f32,
                journal: paper.journal,
                citation_count: paper.citation_count,
                method: RecommendMethod::Trending,
            })
            .collect();

        sort_recommendations(&mut recommendations);
        recommendations.truncate(top_k);

        metrics::counter!(biorag_common::metrics::RECOMMENDATIONS_TOTAL).increment(1);
        Ok(recommendations)
    }
}

/// Mean of a batch of embeddings; `None` for an empty batch
fn mean_embedding(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = embeddings.first()?;
    let mut mean = vec![0.0f32; first.len()];

    for embedding in embeddings {
        for (slot, value) in mean.iter_mut().zip(embedding) {
            *slot += value;
        }
    }

    let count = embeddings.len() as f32;
    for slot in &mut mean {
        *slot /= count;
    }
    Some(mean)
}

/// Normalize scores to [0, 1] by the maximum; empty input yields an empty
/// map.
fn normalize_scores(recommendations: &[RecommendationScore]) -> HashMap<String, f32> {
    let max_score = recommendations
        .iter()
        .map(|r| r.score)
        .fold(f32::MIN, f32::max);
    if recommendations.is_empty() || max_score <= 0.0 {
        return recommendations
            .iter()
            .map(|r| (r.paper_id.clone(), 0.0))
            .collect();
    }

    recommendations
        .iter()
        .map(|r| (r.paper_id.clone(), r.score / max_score))
        .collect()
}

/// Blend two normalized score maps over the union of their keys.
fn merge_scores(
    content: &HashMap<String, f32>,
    citation: &HashMap<String, f32>,
    content_weight: f32,
) -> HashMap<String, f32> {
    let citation_weight = 1.0 - content_weight;
    let mut merged = HashMap::new();

    for (pmid, score) in content {
        merged.insert(pmid.clone(), score * content_weight);
    }
    for (pmid, score) in citation {
        *merged.entry(pmid.clone()).or_insert(0.0) += score * citation_weight;
    }

    merged
}

fn sort_recommendations(recommendations: &mut [RecommendationScore]) {
    recommendations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.paper_id.cmp(&b.paper_id))
    });
}
