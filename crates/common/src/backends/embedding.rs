//! Embedding backend clients
//!
//! `HttpEmbedder` talks to an OpenAI-compatible `/embeddings` endpoint (also
//! the wire shape served by text-embeddings-inference for biomedical models
//! such as PubMedBERT). `MockEmbedder` is for development and tests.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// HTTP embedding client
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    normalize: bool,
    max_retries: u32,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create an embedder from configuration
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| EngineError::Configuration {
                message: "embedding.endpoint is required for HttpEmbedder".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            normalize: config.normalize,
            max_retries: config.max_retries,
            batch_size: config.batch_size,
        })
    }

    /// Make request with bounded exponential-backoff retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
                metrics::counter!(crate::metrics::BACKEND_RETRIES_TOTAL, "backend" => "embedding")
                    .increment(1);
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::EmbeddingBackend {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::EmbeddingBackend {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::EmbeddingBackend {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EngineError::EmbeddingBackend {
                    message: format!("Failed to parse response: {}", e),
                })?;

        let mut embeddings: Vec<Vec<f32>> = result.data.into_iter().map(|e| e.embedding).collect();

        if self.normalize {
            for embedding in &mut embeddings {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::EmbeddingBackend {
                message: "Empty response".to_string(),
            })
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size.max(1)) {
            let embeddings = self.request_with_retry(batch).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for development
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut vector: Vec<f32> = (0..self.dimension).map(|_| rng.gen::<f32>()).collect();
        l2_normalize(&mut vector);
        Ok(vector)
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for _ in texts {
            embeddings.push(self.encode("").await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
