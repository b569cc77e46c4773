//! In-memory vector index
//!
//! Brute-force cosine search over the full chunk set. The reference
//! implementation for tests and local development; production deployments
//! plug in a real index behind the same [`VectorIndex`] trait.

use super::{ChunkHit, IndexFilter, IndexedChunk, VectorIndex};
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Brute-force cosine index
pub struct InMemoryVectorIndex {
    chunks: RwLock<HashMap<Uuid, IndexedChunk>>,
    dimension: usize,
}

impl InMemoryVectorIndex {
    /// Create an empty index for the given embedding dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            dimension,
        }
    }

    /// Number of chunks currently indexed
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Whether the index holds no chunks
    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        for chunk in &chunks {
            if chunk.embedding.len() != self.dimension {
                return Err(EngineError::VectorIndex {
                    message: format!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        self.dimension,
                        chunk.embedding.len()
                    ),
                });
            }
        }

        let mut guard = self.chunks.write().await;
        for chunk in chunks {
            guard.insert(chunk.id, chunk);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<ChunkHit>> {
        if vector.len() != self.dimension {
            return Err(EngineError::VectorIndex {
                message: format!(
                    "Query dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                ),
            });
        }

        let guard = self.chunks.read().await;
        let mut hits: Vec<ChunkHit> = guard
            .values()
            .filter(|chunk| filter.map_or(true, |f| f.matches(&chunk.metadata)))
            .map(|chunk| ChunkHit {
                id: chunk.id,
                text: chunk.text.clone(),
                distance: 1.0 - Self::cosine_similarity(vector, &chunk.embedding),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        // Ascending distance, chunk id as deterministic tie-break
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn fetch_by_paper(&self, pmid: &str) -> Result<Vec<ChunkHit>> {
        let guard = self.chunks.read().await;
        let mut hits: Vec<ChunkHit> = guard
            .values()
            .filter(|chunk| chunk.metadata.pmid == pmid)
            .map(|chunk| ChunkHit {
                id: chunk.id,
                text: chunk.text.clone(),
                distance: 0.0,
                metadata: chunk.metadata.clone(),
            })
            .collect();

        hits.sort_by_key(|hit| hit.metadata.chunk_index);
        Ok(hits)
    }

    async fn delete_by_paper(&self, pmid: &str) -> Result<usize> {
        let mut guard = self.chunks.write().await;
        let before = guard.len();
        guard.retain(|_, chunk| chunk.metadata.pmid != pmid);
        Ok(before - guard.len())
    }
}
