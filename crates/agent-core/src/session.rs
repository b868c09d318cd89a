//! Session Management
//!
//! One session per live connection. It owns its conversation exclusively and
//! is discarded when the connection closes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{Conversation, Turn};
use crate::error::Result;
use crate::reasoning::Agent;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single client's conversation plus the shared agent that drives it
pub struct Session {
    id: SessionId,
    agent: Arc<Agent>,
    conversation: Conversation,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session with an empty conversation
    pub fn new(agent: Arc<Agent>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            agent,
            conversation: Conversation::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Handle one user message and return the reply text.
    ///
    /// Loop failures become an `Agent error: …` reply; the user turn stays in
    /// the conversation so the next message continues from here.
    pub async fn process(&mut self, user_text: &str) -> String {
        match self.try_process(user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "Agent loop failed");
                format!("Agent error: {e}")
            }
        }
    }

    /// Like [`Session::process`] but surfaces the error
    pub async fn try_process(&mut self, user_text: &str) -> Result<String> {
        self.touch();
        self.conversation.push(Turn::user(user_text));
        let result = self.agent.run(&mut self.conversation).await;
        self.touch();
        result
    }

    /// Update the activity timestamp
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Turn count
    pub fn turn_count(&self) -> usize {
        self.conversation.len()
    }

    /// Time between creation and the last activity
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }
}
