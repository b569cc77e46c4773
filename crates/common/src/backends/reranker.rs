//! Cross-encoder rerank backend clients
//!
//! `HttpReranker` posts to a text-embeddings-inference style `/rerank`
//! endpoint. `SerialReranker` wraps any backend whose underlying inference
//! resource is not safe for concurrent calls.

use super::RerankBackend;
use crate::config::RerankConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

/// HTTP rerank client
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct RerankRow {
    index: usize,
    score: f32,
}

impl HttpReranker {
    /// Create a reranker from configuration. Returns None when no endpoint
    /// is configured, which disables reranking entirely.
    pub fn from_config(config: &RerankConfig) -> Result<Option<Self>> {
        let base_url = match &config.endpoint {
            Some(url) => url.clone(),
            None => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            base_url,
            model: config.model.clone(),
        }))
    }
}

#[async_trait]
impl RerankBackend for HttpReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url.trim_end_matches('/'));
        let request = RerankRequest {
            query,
            texts: passages,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::RerankBackend {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::RerankBackend {
                message: format!("API error {}: {}", status, body),
            });
        }

        let rows: Vec<RerankRow> =
            response
                .json()
                .await
                .map_err(|e| EngineError::RerankBackend {
                    message: format!("Failed to parse response: {}", e),
                })?;

        // The service returns rows sorted by score; restore input order
        let mut scores = vec![0.0_f32; passages.len()];
        for row in rows {
            if row.index < scores.len() {
                scores[row.index] = row.score;
            } else {
                return Err(EngineError::RerankBackend {
                    message: format!("Response index {} out of range", row.index),
                });
            }
        }

        Ok(scores)
    }
}

/// Serializing wrapper for rerank backends that cannot run concurrent
/// inference (e.g. a single in-process model handle).
///
/// Shared across requests, so serialization couples latency between
/// unrelated callers. Accepting that is the point of this wrapper.
pub struct SerialReranker<B: RerankBackend> {
    inner: Mutex<B>,
}

impl<B: RerankBackend> SerialReranker<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl<B: RerankBackend> RerankBackend for SerialReranker<B> {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let guard = self.inner.lock().await;
        guard.score(query, passages).await
    }
}
