//! BioRAG Common Library
//!
//! Shared code for the BioRAG retrieval-ranking-generation engine:
//! - Error types and retry classification
//! - Configuration management
//! - External backend contracts (embedding, vector index, reranker, LLM, paper store)
//! - In-memory reference backends for tests and local development
//! - Telemetry and metrics bootstrap

pub mod backends;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use backends::{Embedder, GenerativeBackend, PaperStore, RerankBackend, VectorIndex};
pub use config::EngineConfig;
pub use errors::{EngineError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model (biomedical domain)
pub const DEFAULT_EMBEDDING_MODEL: &str = "microsoft/BiomedNLP-PubMedBERT-base-uncased-abstract";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Default cross-encoder rerank model
pub const DEFAULT_RERANK_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-12-v2";
