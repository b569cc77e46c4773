//! Configuration management for the BioRAG engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/<env>, config/local)
//! - Default values

use crate::errors::{EngineError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generative model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reranker backend configuration
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Text chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Search pipeline configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Recommendation configuration
    #[serde(default)]
    pub recommend: RecommendConfig,

    /// Conversation store configuration
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// API base URL for the embedding service
    pub endpoint: Option<String>,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// L2-normalize embeddings client-side
    #[serde(default = "default_normalize")]
    pub normalize: bool,

    /// Request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries before surfacing BackendUnavailable
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum generation attempts (exponential backoff between attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    /// Rerank service endpoint; reranking is skipped when unset
    pub endpoint: Option<String>,

    /// Cross-encoder model name
    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Window size in tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive windows in tokens
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Windows below this token count are dropped
    #[serde(default = "default_min_chunk_tokens")]
    pub min_chunk_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Default result count
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Hard cap on requested result count
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Chunk-hit oversampling factor before paper aggregation
    #[serde(default = "default_oversample")]
    pub oversample_factor: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendConfig {
    /// Content score weight in hybrid merging (citation weight = 1 - this)
    #[serde(default = "default_content_weight")]
    pub content_weight: f32,

    /// Oversampling factor for content similarity retrieval
    #[serde(default = "default_oversample")]
    pub oversample_factor: usize,

    /// Default trending window in days
    #[serde(default = "default_trending_days")]
    pub trending_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationConfig {
    /// Maximum messages retained per session (oldest evicted first)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_embedding_model() -> String {
    crate::DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_embedding_dimension() -> usize {
    crate::DEFAULT_EMBEDDING_DIMENSION
}
fn default_normalize() -> bool {
    true
}
fn default_backend_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_batch_size() -> usize {
    32
}
fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_llm_model() -> String {
    "gpt-4-turbo-preview".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_rerank_model() -> String {
    crate::DEFAULT_RERANK_MODEL.to_string()
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_min_chunk_tokens() -> usize {
    50
}
fn default_search_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    100
}
fn default_oversample() -> usize {
    3
}
fn default_content_weight() -> f32 {
    0.7
}
fn default_trending_days() -> i64 {
    30
}
fn default_max_history() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_service_name() -> String {
    "biorag".to_string()
}

impl EngineConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        // Load .env file if present (development convenience)
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__CHUNKING__CHUNK_SIZE=512
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(EngineError::Configuration {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    self.chunking.chunk_overlap, self.chunking.chunk_size
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.recommend.content_weight) {
            return Err(EngineError::Configuration {
                message: format!(
                    "content_weight must be in [0, 1], got {}",
                    self.recommend.content_weight
                ),
            });
        }
        if self.search.oversample_factor == 0 || self.recommend.oversample_factor == 0 {
            return Err(EngineError::Configuration {
                message: "oversample_factor must be at least 1".to_string(),
            });
        }
        if self.conversation.max_history == 0 {
            return Err(EngineError::Configuration {
                message: "conversation.max_history must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get LLM request timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// Get embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }
}

macro_rules! impl_section_default {
    ($ty:ty) => {
        impl Default for $ty {
            fn default() -> Self {
                // Every field has a serde default, so an empty source yields the defaults
                serde_json::from_value(serde_json::json!({}))
                    .expect("section defaults must deserialize")
            }
        }
    };
}

impl_section_default!(EmbeddingConfig);
impl_section_default!(LlmConfig);
impl_section_default!(RerankConfig);
impl_section_default!(ChunkingConfig);
impl_section_default!(SearchConfig);
impl_section_default!(RecommendConfig);
impl_section_default!(ConversationConfig);
impl_section_default!(ObservabilityConfig);

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            rerank: RerankConfig::default(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            recommend: RecommendConfig::default(),
            conversation: ConversationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
