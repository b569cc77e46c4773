//! Error types for the BioRAG engine
//!
//! Provides:
//! - Distinct error variants per failure mode
//! - Machine-readable error codes for API-layer mapping
//! - Transience classification driving the retry policy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFilter,

    // Resource errors (4xxx)
    NotFound,
    PaperNotFound,
    SessionNotFound,

    // External service errors (8xxx)
    EmbeddingError,
    VectorIndexError,
    RerankError,
    GenerationError,
    BackendTimeout,
    StoreError,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFilter => 1002,

            ErrorCode::NotFound => 4001,
            ErrorCode::PaperNotFound => 4002,
            ErrorCode::SessionNotFound => 4003,

            ErrorCode::EmbeddingError => 8001,
            ErrorCode::VectorIndexError => 8002,
            ErrorCode::RerankError => 8003,
            ErrorCode::GenerationError => 8004,
            ErrorCode::BackendTimeout => 8005,
            ErrorCode::StoreError => 8006,
            ErrorCode::UpstreamError => 8007,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation errors — never retried
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Malformed filter: {message}")]
    InvalidFilter { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Paper not found: {id}")]
    PaperNotFound { id: String },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    // External backend errors — transient, retried locally before escalating
    #[error("Embedding backend error: {message}")]
    EmbeddingBackend { message: String },

    #[error("Vector index error: {message}")]
    VectorIndex { message: String },

    #[error("Rerank backend error: {message}")]
    RerankBackend { message: String },

    #[error("Generation backend error: {message}")]
    GenerationBackend { message: String },

    #[error("Backend timeout for {service} after {timeout_ms}ms")]
    BackendTimeout { service: String, timeout_ms: u64 },

    #[error("Paper store error: {message}")]
    Store { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } => ErrorCode::ValidationError,
            EngineError::InvalidFilter { .. } => ErrorCode::InvalidFilter,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::PaperNotFound { .. } => ErrorCode::PaperNotFound,
            EngineError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            EngineError::EmbeddingBackend { .. } => ErrorCode::EmbeddingError,
            EngineError::VectorIndex { .. } => ErrorCode::VectorIndexError,
            EngineError::RerankBackend { .. } => ErrorCode::RerankError,
            EngineError::GenerationBackend { .. } => ErrorCode::GenerationError,
            EngineError::BackendTimeout { .. } => ErrorCode::BackendTimeout,
            EngineError::Store { .. } => ErrorCode::StoreError,
            EngineError::HttpClient(_) => ErrorCode::UpstreamError,
            EngineError::Internal { .. } => ErrorCode::InternalError,
            EngineError::Configuration { .. } => ErrorCode::ConfigurationError,
            EngineError::Serialization(_) => ErrorCode::SerializationError,
            EngineError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the failure is worth retrying with backoff.
    ///
    /// Structural and validation errors are never transient; backend and
    /// transport failures are.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::EmbeddingBackend { .. }
                | EngineError::VectorIndex { .. }
                | EngineError::RerankBackend { .. }
                | EngineError::GenerationBackend { .. }
                | EngineError::BackendTimeout { .. }
                | EngineError::HttpClient(_)
        )
    }

    /// Whether this error originated in an external backend
    pub fn is_backend(&self) -> bool {
        self.is_transient() || matches!(self, EngineError::Store { .. })
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = EngineError::PaperNotFound { id: "12345".into() };
        assert_eq!(err.code(), ErrorCode::PaperNotFound);
        assert_eq!(err.code().as_code(), 4002);
    }

    #[test]
    fn test_transience() {
        let backend = EngineError::GenerationBackend {
            message: "502 from upstream".into(),
        };
        assert!(backend.is_transient());

        let filter = EngineError::InvalidFilter {
            message: "year_end < year_start".into(),
        };
        assert!(!filter.is_transient());
        assert!(!filter.is_backend());
    }

    #[test]
    fn test_timeout_is_backend() {
        let err = EngineError::BackendTimeout {
            service: "generation".into(),
            timeout_ms: 30_000,
        };
        assert!(err.is_transient());
        assert!(err.is_backend());
    }
}
