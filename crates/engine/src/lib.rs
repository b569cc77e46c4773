//! BioRAG engine
//!
//! Core pipeline for biomedical literature question answering: chunking,
//! query expansion, vector retrieval with paper aggregation, metadata
//! filtering, cross-encoder reranking, grounded answer generation with
//! citation auditing, bounded conversation history, and paper
//! recommendation.
//!
//! External collaborators (embedding model, vector index, reranker,
//! generative model, paper store) enter through the trait objects defined
//! in `biorag-common`; everything here is deterministic given those.

pub mod chunker;
pub mod expand;
pub mod filters;
pub mod rag;
pub mod recommend;
pub mod rerank;
pub mod retrieval;
pub mod search;

pub use chunker::{Chunk, Chunker};
pub use expand::QueryExpander;
pub use filters::{apply_filters, SearchFilters, SortBy};
pub use rag::conversation::{ConversationStore, Message, Role};
pub use rag::{
    validate_citations, AnswerEngine, AnswerStream, AskRequest, CitationReport, RagAnswer,
    SourceInfo, StreamEvent,
};
pub use recommend::{RecommendMethod, Recommender, RecommendationScore};
pub use rerank::RerankAdapter;
pub use retrieval::{aggregate_by_paper, ChunkMatch, RankedResult, Retriever, SearchCandidate};
pub use search::{SearchEngine, SearchRequest};
