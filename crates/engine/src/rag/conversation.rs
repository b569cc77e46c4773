//! Conversation session store
//!
//! Bounded per-session history backing multi-turn answering. Sessions are
//! keyed by caller-supplied ids and capped at `max_history` messages; the
//! oldest messages roll off first.

use crate::rag::SourceInfo;
use biorag_common::config::ConversationConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    /// Sources cited by an assistant turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceInfo>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceInfo>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: Some(sources),
        }
    }
}

/// In-memory bounded conversation store.
///
/// A single lock guards the whole session map; history reads clone the
/// messages out so callers never hold the lock across an await.
pub struct ConversationStore {
    max_history: usize,
    sessions: RwLock<HashMap<String, VecDeque<Message>>>,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        Self {
            max_history: config.max_history.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Append a message, evicting the oldest once the cap is reached.
    /// Unknown session ids create a new session.
    pub async fn add_message(&self, session_id: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        let history = sessions.entry(session_id.to_string()).or_default();

        history.push_back(message);
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Current history, oldest first. Unknown sessions yield an empty
    /// history rather than an error.
    pub async fn get_history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a session. Returns whether it existed.
    pub async fn clear(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id).is_some()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
