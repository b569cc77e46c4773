//! Search orchestration
//!
//! Ties the pipeline together: validate filters, expand the query, embed,
//! retrieve oversampled chunks, aggregate to papers, filter, optionally
//! rerank, truncate. Filter validation runs before any backend call so a
//! bad request never costs an embedding.

use crate::expand::QueryExpander;
use crate::filters::{apply_filters, SearchFilters, SortBy};
use crate::rerank::RerankAdapter;
use crate::retrieval::{aggregate_by_paper, RankedResult, Retriever};
use biorag_common::backends::Embedder;
use biorag_common::config::SearchConfig;
use biorag_common::errors::{EngineError, Result};
use std::sync::Arc;

/// Paper search engine
pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    expander: QueryExpander,
    retriever: Arc<Retriever>,
    reranker: Option<Arc<RerankAdapter>>,
    default_limit: usize,
    max_limit: usize,
}

/// Search request parameters
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,

    /// Result count; 0 means the configured default
    pub top_k: usize,

    /// Metadata filters
    pub filters: SearchFilters,

    /// Rescore with the cross-encoder when one is configured
    pub rerank: bool,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<Retriever>,
        reranker: Option<Arc<RerankAdapter>>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            embedder,
            expander: QueryExpander::new(),
            retriever,
            reranker,
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    /// Run a paper search end to end.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RankedResult>> {
        request.filters.validate()?;

        let query = request.query.trim();
        if query.is_empty() {
            return Err(EngineError::Validation {
                message: "query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let top_k = self.clamp_limit(request.top_k);
        let expanded = self.expander.expand(query);
        let embedding = self.embedder.encode(&expanded).await?;

        let hits = self.retriever.search_chunks(&embedding, top_k, None).await?;
        let candidates = aggregate_by_paper(&hits);
        let mut candidates = apply_filters(candidates, &request.filters);

        if request.rerank && request.filters.sort_by == SortBy::Relevance {
            if let Some(reranker) = &self.reranker {
                candidates = reranker.rerank_papers(query, candidates).await?;
            }
        }

        candidates.truncate(top_k);

        metrics::counter!(biorag_common::metrics::SEARCHES_TOTAL).increment(1);
        tracing::info!(
            query,
            top_k,
            results = candidates.len(),
            reranked = request.rerank && self.reranker.is_some(),
            "Search completed"
        );

        Ok(candidates.into_iter().map(RankedResult::from).collect())
    }

    /// Clamp the requested result count to `[1, max_limit]`, defaulting when
    /// zero.
    fn clamp_limit(&self, top_k: usize) -> usize {
        if top_k == 0 {
            self.default_limit
        } else {
            top_k.min(self.max_limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biorag_common::backends::{
        IndexedChunk, ChunkMetadata, InMemoryVectorIndex, MockEmbedder, VectorIndex,
    };
    use uuid::Uuid;

    const DIM: usize = 8;

    fn metadata(pmid: &str, journal: Option<&str>, year: i32) -> ChunkMetadata {
        ChunkMetadata {
            pmid: pmid.to_string(),
            title: format!("Paper {}", pmid),
            section: "abstract".to_string(),
            chunk_index: 0,
            token_count: 60,
            journal: journal.map(str::to_string),
            publication_date: chrono::NaiveDate::from_ymd_opt(year, 1, 1),
            citation_count: 0,
        }
    }

    /// Axis-aligned embeddings make similarity predictable: a chunk on the
    /// same axis as the query scores 1.0, orthogonal chunks score 0.0.
    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[i] = 1.0;
        v
    }

    struct AxisEmbedder;

    #[async_trait::async_trait]
    impl Embedder for AxisEmbedder {
        async fn encode(&self, _text: &str) -> biorag_common::errors::Result<Vec<f32>> {
            Ok(axis(0))
        }

        async fn encode_batch(
            &self,
            texts: &[String],
        ) -> biorag_common::errors::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| axis(0)).collect())
        }

        fn model_name(&self) -> &str {
            "axis-test"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    async fn seeded_engine() -> SearchEngine {
        let index = Arc::new(InMemoryVectorIndex::new(DIM));
        index
            .upsert(vec![
                IndexedChunk {
                    id: Uuid::new_v4(),
                    embedding: axis(0),
                    text: "on-topic chunk".to_string(),
                    metadata: metadata("100", Some("Nature"), 2022),
                },
                IndexedChunk {
                    id: Uuid::new_v4(),
                    embedding: axis(1),
                    text: "off-topic chunk".to_string(),
                    metadata: metadata("200", Some("Cell"), 2015),
                },
            ])
            .await
            .unwrap();

        let retriever = Arc::new(Retriever::new(index, 3));
        SearchEngine::new(
            Arc::new(AxisEmbedder),
            retriever,
            None,
            &SearchConfig {
                default_limit: 10,
                max_limit: 100,
                oversample_factor: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let engine = seeded_engine().await;
        let results = engine
            .search(&SearchRequest {
                query: "anything".to_string(),
                top_k: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(results[0].paper_id, "100");
        assert!(results[0].relevance_score > results[1].relevance_score);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let engine = seeded_engine().await;
        let err = engine
            .search(&SearchRequest {
                query: "   ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_invalid_filters_fail_before_retrieval() {
        let engine = seeded_engine().await;
        let err = engine
            .search(&SearchRequest {
                query: "cancer".to_string(),
                filters: SearchFilters {
                    year_start: Some(2024),
                    year_end: Some(2020),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFilter { .. }));
    }

    #[tokio::test]
    async fn test_year_filter_applied() {
        let engine = seeded_engine().await;
        let results = engine
            .search(&SearchRequest {
                query: "anything".to_string(),
                filters: SearchFilters {
                    year_start: Some(2020),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].paper_id, "100");
    }

    #[tokio::test]
    async fn test_rerank_skipped_under_explicit_sort() {
        use crate::rerank::RerankAdapter;
        use biorag_common::backends::RerankBackend;

        struct PanicScorer;

        #[async_trait::async_trait]
        impl RerankBackend for PanicScorer {
            async fn score(
                &self,
                _query: &str,
                _passages: &[String],
            ) -> biorag_common::errors::Result<Vec<f32>> {
                panic!("reranker must not run when an explicit sort is requested");
            }
        }

        // Two candidates, so a rerank pass would actually hit the backend
        let index = Arc::new(InMemoryVectorIndex::new(DIM));
        index
            .upsert(vec![
                IndexedChunk {
                    id: Uuid::new_v4(),
                    embedding: axis(0),
                    text: "chunk".to_string(),
                    metadata: metadata("100", Some("Nature"), 2022),
                },
                IndexedChunk {
                    id: Uuid::new_v4(),
                    embedding: axis(1),
                    text: "other".to_string(),
                    metadata: ChunkMetadata {
                        citation_count: 500,
                        ..metadata("200", Some("Cell"), 2019)
                    },
                },
            ])
            .await
            .unwrap();

        let engine = SearchEngine::new(
            Arc::new(AxisEmbedder),
            Arc::new(Retriever::new(index, 3)),
            Some(Arc::new(RerankAdapter::new(Arc::new(PanicScorer)))),
            &SearchConfig {
                default_limit: 10,
                max_limit: 100,
                oversample_factor: 3,
            },
        );

        // A citations sort must survive; cross-encoder scores would clobber it
        let results = engine
            .search(&SearchRequest {
                query: "anything".to_string(),
                rerank: true,
                filters: SearchFilters {
                    sort_by: SortBy::Citations,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        // Citation order wins over vector similarity, untouched by the
        // cross-encoder
        assert_eq!(results[0].paper_id, "200");
    }

    #[tokio::test]
    async fn test_top_k_zero_uses_default_and_large_is_clamped() {
        let engine = seeded_engine().await;
        assert_eq!(engine.clamp_limit(0), 10);
        assert_eq!(engine.clamp_limit(5000), 100);
        assert_eq!(engine.clamp_limit(7), 7);
    }

    #[tokio::test]
    async fn test_mock_embedder_pipeline_smoke() {
        // End-to-end with the random embedder: results come back, scores are
        // finite, count respects top_k.
        let index = Arc::new(InMemoryVectorIndex::new(768));
        let embedder = MockEmbedder::new(768);
        let chunk_embedding = embedder.encode("seed").await.unwrap();
        index
            .upsert(vec![IndexedChunk {
                id: Uuid::new_v4(),
                embedding: chunk_embedding,
                text: "seed chunk".to_string(),
                metadata: metadata("1", None, 2020),
            }])
            .await
            .unwrap();

        let engine = SearchEngine::new(
            Arc::new(embedder),
            Arc::new(Retriever::new(index, 3)),
            None,
            &SearchConfig {
                default_limit: 10,
                max_limit: 100,
                oversample_factor: 3,
            },
        );

        let results = engine
            .search(&SearchRequest {
                query: "immunotherapy".to_string(),
                top_k: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].relevance_score.is_finite());
    }
}
