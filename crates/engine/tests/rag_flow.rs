//! End-to-end answering flow against scripted backends

use async_trait::async_trait;
use biorag_common::backends::{
    ChunkMetadata, Embedder, GenerativeBackend, IndexedChunk, InMemoryVectorIndex, TextStream,
    VectorIndex,
};
use biorag_common::config::{ConversationConfig, LlmConfig};
use biorag_common::errors::{EngineError, Result};
use biorag_engine::rag::conversation::ConversationStore;
use biorag_engine::rag::{AnswerEngine, AskRequest, StreamEvent};
use biorag_engine::retrieval::Retriever;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const DIM: usize = 4;

/// Deterministic embedder: every text lands on the same axis, so every
/// indexed chunk is retrievable with similarity 1.0.
struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }

    fn model_name(&self) -> &str {
        "fixed-test"
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Generative backend that replays a script of responses, recording the
/// prompts it receives.
struct ScriptedLlm {
    responses: Mutex<Vec<Result<String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn answering(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(user_prompt.to_string());
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(EngineError::GenerationBackend {
                message: "script exhausted".to_string(),
            });
        }
        responses.remove(0)
    }

    async fn complete_stream(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<TextStream> {
        let mut responses = self.responses.lock().await;
        let text = match responses.remove(0) {
            Ok(text) => text,
            Err(err) => return Err(err),
        };
        let fragments: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

fn metadata(pmid: &str, section: &str) -> ChunkMetadata {
    ChunkMetadata {
        pmid: pmid.to_string(),
        title: format!("Paper {}", pmid),
        section: section.to_string(),
        chunk_index: 0,
        token_count: 60,
        journal: Some("Nature".to_string()),
        publication_date: None,
        citation_count: 12,
    }
}

async fn seeded_index(papers: &[(&str, &str)]) -> Arc<InMemoryVectorIndex> {
    let index = Arc::new(InMemoryVectorIndex::new(DIM));
    let chunks = papers
        .iter()
        .map(|(pmid, text)| IndexedChunk {
            id: Uuid::new_v4(),
            embedding: vec![1.0, 0.0, 0.0, 0.0],
            text: text.to_string(),
            metadata: metadata(pmid, "abstract"),
        })
        .collect();
    index.upsert(chunks).await.unwrap();
    index
}

fn engine(
    index: Arc<InMemoryVectorIndex>,
    llm: Arc<ScriptedLlm>,
    max_retries: u32,
) -> (AnswerEngine, Arc<ConversationStore>) {
    let conversations = Arc::new(ConversationStore::new(&ConversationConfig { max_history: 10 }));
    let config = LlmConfig {
        max_retries,
        ..LlmConfig::default()
    };
    let engine = AnswerEngine::new(
        Arc::new(FixedEmbedder),
        Arc::new(Retriever::new(index, 3)),
        None,
        llm,
        conversations.clone(),
        &config,
    );
    (engine, conversations)
}

#[tokio::test]
async fn test_grounded_answer_scores_high_confidence() {
    let index = seeded_index(&[
        ("11111", "CAR-T cells target CD19 in B-cell malignancies."),
        ("22222", "Cytokine release syndrome is a common toxicity."),
    ])
    .await;
    let llm = Arc::new(ScriptedLlm::answering(
        "CAR-T therapy targets CD19 [PMID: 11111] with notable toxicity [PMID: 22222].",
    ));
    let (engine, _) = engine(index, llm.clone(), 3);

    let answer = engine
        .ask(&AskRequest {
            question: "How does CAR-T therapy work?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0.9);
    assert_eq!(answer.chunks_used, 2);
    assert_eq!(answer.sources.len(), 2);
    assert!(answer.answer.contains("[PMID: 11111]"));

    // The context handed to the model names both papers
    let prompts = llm.prompts.lock().await;
    assert!(prompts[0].contains("PMID: 11111"));
    assert!(prompts[0].contains("PMID: 22222"));
    assert!(prompts[0].contains("Question: How does CAR-T therapy work?"));
}

#[tokio::test]
async fn test_hallucinated_citation_scores_low_confidence() {
    let index = seeded_index(&[("22222", "Some unrelated finding.")]).await;
    let llm = Arc::new(ScriptedLlm::answering(
        "The key trial showed efficacy [PMID: 11111].",
    ));
    let (engine, _) = engine(index, llm, 3);

    let answer = engine
        .ask(&AskRequest {
            question: "What did the trial show?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0.3);
    // Sources still reflect what was retrieved, not what was cited
    assert_eq!(answer.sources[0].pmid, "22222");
}

#[tokio::test]
async fn test_empty_index_returns_fixed_answer() {
    let index = Arc::new(InMemoryVectorIndex::new(DIM));
    let llm = Arc::new(ScriptedLlm::answering("should never be called"));
    let (engine, _) = engine(index, llm.clone(), 3);

    let answer = engine
        .ask(&AskRequest {
            question: "Anything at all?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0.0);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.chunks_used, 0);
    assert!(answer.answer.contains("could not find any relevant information"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_failure_retried_then_succeeds() {
    let index = seeded_index(&[("11111", "Finding.")]).await;
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(EngineError::GenerationBackend {
            message: "upstream hiccup".to_string(),
        }),
        Ok("Grounded [PMID: 11111].".to_string()),
    ]));
    let (engine, _) = engine(index, llm.clone(), 3);

    let answer = engine
        .ask(&AskRequest {
            question: "What was found?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0.9);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retries_exhausted_surfaces_error() {
    let index = seeded_index(&[("11111", "Finding.")]).await;
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(EngineError::GenerationBackend {
            message: "down".to_string(),
        }),
        Err(EngineError::GenerationBackend {
            message: "still down".to_string(),
        }),
    ]));
    let (engine, _) = engine(index, llm.clone(), 2);

    let err = engine
        .ask(&AskRequest {
            question: "What was found?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::GenerationBackend { .. }));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_conversation_recorded_and_folded_into_followup() {
    let index = seeded_index(&[("11111", "CAR-T targets CD19.")]).await;
    let llm = Arc::new(ScriptedLlm::new(vec![
        Ok("It targets CD19 [PMID: 11111].".to_string()),
        Ok("Yes, in B-cell malignancies [PMID: 11111].".to_string()),
    ]));
    let (engine, conversations) = engine(index, llm.clone(), 3);

    let session = Some("session-1".to_string());
    engine
        .ask(&AskRequest {
            question: "What does CAR-T target?".to_string(),
            session_id: session.clone(),
            ..Default::default()
        })
        .await
        .unwrap();

    let history = conversations.get_history("session-1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "What does CAR-T target?");
    assert!(history[1].sources.is_some());

    engine
        .ask(&AskRequest {
            question: "Is it used clinically?".to_string(),
            session_id: session,
            ..Default::default()
        })
        .await
        .unwrap();

    // The second prompt carries the first exchange
    let prompts = llm.prompts.lock().await;
    assert!(prompts[1].contains("Previous conversation:"));
    assert!(prompts[1].contains("User: What does CAR-T target?"));
    assert_eq!(conversations.get_history("session-1").await.len(), 4);
}

#[tokio::test]
async fn test_stream_yields_tokens_then_sources() {
    let index = seeded_index(&[("11111", "CAR-T targets CD19.")]).await;
    let llm = Arc::new(ScriptedLlm::answering("It targets CD19 [PMID: 11111]."));
    let (engine, _) = engine(index, llm, 3);

    let stream = engine
        .ask_stream(&AskRequest {
            question: "What does CAR-T target?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let events: Vec<StreamEvent> = stream
        .map(|e| e.unwrap())
        .collect()
        .await;

    let mut text = String::new();
    let mut sources = None;
    for event in &events {
        match event {
            StreamEvent::Token { text: fragment } => {
                assert!(sources.is_none(), "tokens must precede sources");
                text.push_str(fragment);
            }
            StreamEvent::Sources { sources: s } => sources = Some(s.clone()),
        }
    }

    assert_eq!(text, "It targets CD19 [PMID: 11111].");
    let sources = sources.expect("terminal sources event");
    assert_eq!(sources[0].pmid, "11111");
}

#[tokio::test]
async fn test_stream_records_completed_turn_with_sources() {
    let index = seeded_index(&[("11111", "CAR-T targets CD19.")]).await;
    let llm = Arc::new(ScriptedLlm::answering("It targets CD19 [PMID: 11111]."));
    let (engine, conversations) = engine(index, llm, 3);

    let stream = engine
        .ask_stream(&AskRequest {
            question: "What does CAR-T target?".to_string(),
            session_id: Some("stream-session".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let _events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;

    let history = conversations.get_history("stream-session").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "What does CAR-T target?");
    // Assistant turn carries the full streamed text and the retrieved sources
    assert_eq!(history[1].content, "It targets CD19 [PMID: 11111].");
    let sources = history[1].sources.as_ref().unwrap();
    assert_eq!(sources[0].pmid, "11111");
}

#[tokio::test]
async fn test_blank_question_rejected() {
    let index = Arc::new(InMemoryVectorIndex::new(DIM));
    let llm = Arc::new(ScriptedLlm::answering("unused"));
    let (engine, _) = engine(index, llm, 3);

    let err = engine
        .ask(&AskRequest {
            question: "  \n ".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}
