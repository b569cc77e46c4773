//! Grounded question answering
//!
//! Retrieval-augmented generation over the chunk index: retrieve context,
//! prompt the generative backend to answer from that context only, then
//! audit the citations the model actually produced. Confidence reflects the
//! audit, not the model's self-assessment.

pub mod conversation;

use crate::expand::QueryExpander;
use crate::rerank::RerankAdapter;
use crate::retrieval::{truncate_chars, ChunkMatch, Retriever};
use biorag_common::backends::{Embedder, GenerativeBackend, TextStream};
use biorag_common::config::LlmConfig;
use biorag_common::errors::{EngineError, Result};
use conversation::{ConversationStore, Message};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Default number of context chunks per question
const DEFAULT_CONTEXT_CHUNKS: usize = 5;

/// Maximum characters in a source excerpt
const SOURCE_EXCERPT_CHARS: usize = 500;

/// Confidence when the answer cites nothing
const CONFIDENCE_UNCITED: f32 = 0.5;

/// Confidence when any citation is absent from the supplied context
const CONFIDENCE_INVALID: f32 = 0.3;

/// Confidence when every citation resolves to a context paper
const CONFIDENCE_GROUNDED: f32 = 0.9;

const SYSTEM_PROMPT: &str = "You are a biomedical research assistant. Answer questions based ONLY on the provided context from research papers. Always cite your sources using the format [PMID: xxxxx] after each claim. If the context does not contain enough information to answer the question, say \"I cannot find sufficient information in the provided papers to answer this question.\" Do not use any knowledge outside the provided context.";

const EMPTY_INDEX_ANSWER: &str =
    "I could not find any relevant information in the database to answer your question.";

fn citation_pattern() -> &'static regex_lite::Regex {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"PMID:\s*(\d+)").expect("citation pattern is valid")
    })
}

/// A cited paper backing an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Paper identifier (PMID)
    pub pmid: String,

    /// Paper title
    pub title: String,

    /// Relevance of the paper's best context chunk
    pub relevance: f32,

    /// Excerpt from the best chunk, capped at 500 characters
    pub excerpt: String,

    /// Section the best chunk came from
    pub section: String,
}

/// A grounded answer with its audit result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    /// Generated answer text, citations included
    pub answer: String,

    /// Papers the context was drawn from
    pub sources: Vec<SourceInfo>,

    /// Citation-audit confidence: 0.9 all citations valid, 0.5 none
    /// present, 0.3 any invalid, 0.0 nothing retrieved
    pub confidence: f32,

    /// Number of context chunks supplied to the model
    pub chunks_used: usize,
}

/// Result of auditing an answer's citations against the context
#[derive(Debug, Clone, PartialEq)]
pub struct CitationReport {
    pub confidence: f32,
    /// Cited PMIDs present in the context
    pub valid: Vec<String>,
    /// Cited PMIDs absent from the context
    pub invalid: Vec<String>,
}

/// Question parameters
#[derive(Debug, Clone)]
pub struct AskRequest {
    /// The question to answer
    pub question: String,

    /// Context chunk count; 0 means the default of 5
    pub top_k: usize,

    /// Conversation to read history from and record the turn into
    pub session_id: Option<String>,

    /// Rescore context chunks with the cross-encoder when one is configured
    pub rerank: bool,
}

impl Default for AskRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            top_k: 0,
            session_id: None,
            rerank: false,
        }
    }
}

/// Incremental event from a streaming answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A fragment of answer text
    Token { text: String },

    /// Terminal event carrying the context papers
    Sources { sources: Vec<SourceInfo> },
}

/// Streaming answer: token events followed by one sources event
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Retrieval-augmented answer engine
#[derive(Clone)]
pub struct AnswerEngine {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<Retriever>,
    reranker: Option<Arc<RerankAdapter>>,
    llm: Arc<dyn GenerativeBackend>,
    conversations: Arc<ConversationStore>,
    expander: QueryExpander,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl AnswerEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<Retriever>,
        reranker: Option<Arc<RerankAdapter>>,
        llm: Arc<dyn GenerativeBackend>,
        conversations: Arc<ConversationStore>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            embedder,
            retriever,
            reranker,
            llm,
            conversations,
            expander: QueryExpander::new(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        }
    }

    /// Answer a question from indexed papers.
    pub async fn ask(&self, request: &AskRequest) -> Result<RagAnswer> {
        let question = validated_question(&request.question)?;
        let chunks = self.retrieve_context(question, request).await?;

        metrics::counter!(biorag_common::metrics::RAG_QUERIES_TOTAL).increment(1);

        if chunks.is_empty() {
            tracing::info!(question, "No context retrieved; returning fixed answer");
            let answer = RagAnswer {
                answer: EMPTY_INDEX_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                chunks_used: 0,
            };
            self.record_turn(request.session_id.as_deref(), question, &answer)
                .await;
            return Ok(answer);
        }

        let history = match request.session_id.as_deref() {
            Some(session_id) => self.conversations.get_history(session_id).await,
            None => Vec::new(),
        };

        let context = build_context(&chunks);
        let user_prompt = build_user_prompt(&context, question, &history);
        let answer_text = self.generate_with_retry(&user_prompt).await?;

        let valid_pmids: HashSet<String> =
            chunks.iter().map(|c| c.metadata.pmid.clone()).collect();
        let report = validate_citations(&answer_text, &valid_pmids);

        if !report.invalid.is_empty() {
            metrics::counter!(biorag_common::metrics::INVALID_CITATIONS_TOTAL).increment(1);
            tracing::warn!(
                question,
                invalid = ?report.invalid,
                "Answer cites papers absent from context"
            );
        }

        let answer = RagAnswer {
            answer: answer_text,
            sources: sources_from_chunks(&chunks),
            confidence: report.confidence,
            chunks_used: chunks.len(),
        };

        self.record_turn(request.session_id.as_deref(), question, &answer)
            .await;

        tracing::info!(
            question,
            confidence = answer.confidence,
            chunks_used = answer.chunks_used,
            "Question answered"
        );
        Ok(answer)
    }

    /// Answer a question as a token stream.
    ///
    /// Yields [`StreamEvent::Token`] fragments as the model produces them,
    /// then a single terminal [`StreamEvent::Sources`] built from a fresh
    /// top-5 retrieval of the question once generation completes. The full
    /// turn is recorded into the conversation when a session is given.
    /// Streamed answers are not citation-audited; the audit needs the
    /// complete text up front.
    pub async fn ask_stream(&self, request: &AskRequest) -> Result<AnswerStream> {
        let question = validated_question(&request.question)?.to_string();
        let chunks = self.retrieve_context(&question, request).await?;

        metrics::counter!(biorag_common::metrics::RAG_QUERIES_TOTAL).increment(1);

        let session_id = request.session_id.clone();
        if let Some(session_id) = session_id.as_deref() {
            self.conversations
                .add_message(session_id, Message::user(question.clone()))
                .await;
        }

        if chunks.is_empty() {
            if let Some(session_id) = session_id.as_deref() {
                self.conversations
                    .add_message(
                        session_id,
                        Message::assistant(EMPTY_INDEX_ANSWER, Vec::new()),
                    )
                    .await;
            }
            let events = vec![
                Ok(StreamEvent::Token {
                    text: EMPTY_INDEX_ANSWER.to_string(),
                }),
                Ok(StreamEvent::Sources { sources: vec![] }),
            ];
            return Ok(Box::pin(futures::stream::iter(events)));
        }

        let context = build_context(&chunks);
        let user_prompt = build_user_prompt(&context, &question, &[]);

        let tokens = self
            .llm
            .complete_stream(SYSTEM_PROMPT, &user_prompt, self.temperature, self.max_tokens)
            .await?;

        enum Phase {
            Streaming(TextStream),
            Done,
        }

        let state = (self.clone(), question, session_id, Phase::Streaming(tokens), String::new());
        let stream = futures::stream::unfold(
            state,
            |(engine, question, session_id, phase, mut answer)| async move {
                let Phase::Streaming(mut tokens) = phase else {
                    return None;
                };

                match tokens.next().await {
                    Some(Ok(text)) => {
                        answer.push_str(&text);
                        Some((
                            Ok(StreamEvent::Token { text }),
                            (engine, question, session_id, Phase::Streaming(tokens), answer),
                        ))
                    }
                    Some(Err(err)) => {
                        // Truncated turn: surface the error and stop without
                        // recording or emitting sources
                        Some((Err(err), (engine, question, session_id, Phase::Done, answer)))
                    }
                    None => {
                        let event = engine
                            .stream_tail(&question, session_id.as_deref(), &answer)
                            .await
                            .map(|sources| StreamEvent::Sources { sources });
                        Some((event, (engine, question, session_id, Phase::Done, answer)))
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }

    /// Finish a streamed turn: retrieve the top 5 chunks for the question
    /// again, build the sources, and record the completed exchange.
    async fn stream_tail(
        &self,
        question: &str,
        session_id: Option<&str>,
        answer: &str,
    ) -> Result<Vec<SourceInfo>> {
        let expanded = self.expander.expand(question);
        let embedding = self.embedder.encode(&expanded).await?;
        let chunks = self
            .retriever
            .search_chunks_exact(&embedding, DEFAULT_CONTEXT_CHUNKS, None)
            .await?;
        let sources = sources_from_chunks(&chunks);

        if let Some(session_id) = session_id {
            self.conversations
                .add_message(session_id, Message::assistant(answer, sources.clone()))
                .await;
        }

        Ok(sources)
    }

    /// Retrieve and score context chunks for a question.
    async fn retrieve_context(
        &self,
        question: &str,
        request: &AskRequest,
    ) -> Result<Vec<ChunkMatch>> {
        let top_k = if request.top_k == 0 {
            DEFAULT_CONTEXT_CHUNKS
        } else {
            request.top_k
        };

        // Retrieve wider when reranking so the cross-encoder has real
        // choices to promote.
        let fetch_k = if request.rerank && self.reranker.is_some() {
            top_k * 2
        } else {
            top_k
        };

        let expanded = self.expander.expand(question);
        let embedding = self.embedder.encode(&expanded).await?;
        let mut chunks = self
            .retriever
            .search_chunks_exact(&embedding, fetch_k, None)
            .await?;

        if request.rerank {
            if let Some(reranker) = &self.reranker {
                chunks = reranker.rerank_chunks(question, chunks).await?;
            }
        }

        chunks.truncate(top_k);
        Ok(chunks)
    }

    /// Call the generative backend, retrying transient failures with
    /// exponential backoff.
    async fn generate_with_retry(&self, user_prompt: &str) -> Result<String> {
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
                metrics::counter!(biorag_common::metrics::BACKEND_RETRIES_TOTAL, "backend" => "generation")
                    .increment(1);
            }

            match self
                .llm
                .complete(SYSTEM_PROMPT, user_prompt, self.temperature, self.max_tokens)
                .await
            {
                Ok(answer) => {
                    metrics::histogram!(biorag_common::metrics::GENERATION_DURATION_SECONDS)
                        .record(started.elapsed().as_secs_f64());
                    return Ok(answer);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.max_retries => {
                    tracing::warn!(attempt, error = %err, "Generation attempt failed; retrying");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::GenerationBackend {
            message: "generation retries exhausted".to_string(),
        }))
    }

    async fn record_turn(&self, session_id: Option<&str>, question: &str, answer: &RagAnswer) {
        if let Some(session_id) = session_id {
            self.conversations
                .add_message(session_id, Message::user(question))
                .await;
            self.conversations
                .add_message(
                    session_id,
                    Message::assistant(answer.answer.clone(), answer.sources.clone()),
                )
                .await;
        }
    }
}

fn validated_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation {
            message: "question must not be empty".to_string(),
            field: Some("question".to_string()),
        });
    }
    Ok(trimmed)
}

/// Format context chunks into numbered paper blocks.
fn build_context(chunks: &[ChunkMatch]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Paper {}] PMID: {}\nTitle: {}\nSection: {}\nContent: {}\n",
                i + 1,
                chunk.metadata.pmid,
                chunk.metadata.title,
                chunk.metadata.section,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_user_prompt(
    context: &str,
    question: &str,
    history: &[Message],
) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for message in history {
            let speaker = match message.role {
                conversation::Role::User => "User",
                conversation::Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Context from research papers:\n{}\n\nQuestion: {}\n\nProvide a detailed answer with citations:",
        context, question
    ));
    prompt
}

/// Audit the `[PMID: xxxxx]` citations in an answer against the PMIDs that
/// were actually in the context.
pub fn validate_citations(answer: &str, valid_pmids: &HashSet<String>) -> CitationReport {
    let mut seen = HashSet::new();
    let mut valid = Vec::new();
    let mut invalid = Vec::new();

    for capture in citation_pattern().captures_iter(answer) {
        let pmid = capture[1].to_string();
        if !seen.insert(pmid.clone()) {
            continue;
        }
        if valid_pmids.contains(&pmid) {
            valid.push(pmid);
        } else {
            invalid.push(pmid);
        }
    }

    let confidence = if valid.is_empty() && invalid.is_empty() {
        CONFIDENCE_UNCITED
    } else if !invalid.is_empty() {
        CONFIDENCE_INVALID
    } else {
        CONFIDENCE_GROUNDED
    };

    CitationReport {
        confidence,
        valid,
        invalid,
    }
}

/// Build per-paper source entries from context chunks, keeping each paper's
/// highest-scoring chunk. Order follows chunk relevance.
fn sources_from_chunks(chunks: &[ChunkMatch]) -> Vec<SourceInfo> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for chunk in chunks {
        if !seen.insert(chunk.metadata.pmid.clone()) {
            continue;
        }

        let mut excerpt = truncate_chars(&chunk.text, SOURCE_EXCERPT_CHARS);
        if chunk.text.chars().count() > SOURCE_EXCERPT_CHARS {
            excerpt.push_str("...");
        }

        sources.push(SourceInfo {
            pmid: chunk.metadata.pmid.clone(),
            title: chunk.metadata.title.clone(),
            relevance: chunk.similarity,
            excerpt,
            section: chunk.metadata.section.clone(),
        });
    }

    sources
}
