//! Metrics and observability utilities
//!
//! Standardized metric names for the engine's hot paths. The exporter is the
//! embedding application's concern; the engine only records.

use metrics::{describe_counter, describe_histogram, Unit};

/// Metrics prefix for all BioRAG metrics
pub const METRICS_PREFIX: &str = "biorag";

/// Histogram buckets for retrieval latency (in seconds)
pub const RETRIEVAL_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
];

/// Buckets for generation latency (LLM calls are slow)
pub const GENERATION_BUCKETS: &[f64] = &[
    0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00, 60.00,
];

/// Counter: total search pipeline invocations
pub const SEARCHES_TOTAL: &str = "biorag_searches_total";

/// Counter: total RAG question invocations
pub const RAG_QUERIES_TOTAL: &str = "biorag_rag_queries_total";

/// Counter: total recommendation invocations
pub const RECOMMENDATIONS_TOTAL: &str = "biorag_recommendations_total";

/// Counter: retries against external backends
pub const BACKEND_RETRIES_TOTAL: &str = "biorag_backend_retries_total";

/// Counter: answers returned with invalid citations
pub const INVALID_CITATIONS_TOTAL: &str = "biorag_invalid_citations_total";

/// Histogram: end-to-end retrieval latency in seconds
pub const RETRIEVAL_DURATION_SECONDS: &str = "biorag_retrieval_duration_seconds";

/// Histogram: generation latency in seconds
pub const GENERATION_DURATION_SECONDS: &str = "biorag_generation_duration_seconds";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(SEARCHES_TOTAL, Unit::Count, "Total search pipeline runs");
    describe_counter!(RAG_QUERIES_TOTAL, Unit::Count, "Total RAG questions answered");
    describe_counter!(
        RECOMMENDATIONS_TOTAL,
        Unit::Count,
        "Total recommendation requests"
    );
    describe_counter!(
        BACKEND_RETRIES_TOTAL,
        Unit::Count,
        "Retries issued against external backends"
    );
    describe_counter!(
        INVALID_CITATIONS_TOTAL,
        Unit::Count,
        "Answers containing citations absent from the supplied context"
    );
    describe_histogram!(
        RETRIEVAL_DURATION_SECONDS,
        Unit::Seconds,
        "Vector retrieval latency in seconds"
    );
    describe_histogram!(
        GENERATION_DURATION_SECONDS,
        Unit::Seconds,
        "Answer generation latency in seconds"
    );
}
