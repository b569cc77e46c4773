//! Generative model backend client
//!
//! `ChatClient` speaks the OpenAI chat-completions wire format, including the
//! SSE streaming variant. A single call is a single attempt; the answer
//! engine owns the retry policy.

use super::{GenerativeBackend, TextStream};
use crate::config::LlmConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// OpenAI-compatible chat completion client
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl ChatClient {
    /// Create a chat client from configuration
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn build_request(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens,
            temperature,
            stream,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder
    }
}

/// SSE line-parsing state for the streaming response body
struct SseState {
    inner: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

impl SseState {
    /// Split completed lines out of the buffer and queue their content deltas
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                self.done = true;
                return;
            }

            if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            self.pending.push_back(content);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl GenerativeBackend for ChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let response = self
            .build_request(system_prompt, user_prompt, temperature, max_tokens, false)
            .send()
            .await
            .map_err(|e| EngineError::GenerationBackend {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::GenerationBackend {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| EngineError::GenerationBackend {
                    message: format!("Failed to parse response: {}", e),
                })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::GenerationBackend {
                message: "Empty response from model".to_string(),
            })
    }

    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<TextStream> {
        let response = self
            .build_request(system_prompt, user_prompt, temperature, max_tokens, true)
            .send()
            .await
            .map_err(|e| EngineError::GenerationBackend {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::GenerationBackend {
                message: format!("API error {}: {}", status, body),
            });
        }

        let state = SseState {
            inner: response.bytes_stream().boxed(),
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Some((Ok(fragment), state));
                }
                if state.done {
                    return None;
                }

                match state.inner.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                        state.drain_lines();
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(EngineError::GenerationBackend {
                                message: format!("Stream error: {}", e),
                            }),
                            state,
                        ));
                    }
                    None => {
                        state.done = true;
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
