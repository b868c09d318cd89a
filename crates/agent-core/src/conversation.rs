//! Conversation Turns
//!
//! The ordered, append-only dialogue history sent to the model on every call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// Role of a turn's author
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input
    User,
    /// Model output, text or tool calls
    Assistant,
    /// Results of the previous assistant turn's tool calls
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// What a turn carries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TurnContent {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolResult>),
}

/// One role-tagged unit of conversation history. Immutable once appended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: TurnContent,

    /// Backend-native form of a model turn, echoed back verbatim on later calls
    #[serde(skip_serializing_if = "Option::is_none")]
    native: Option<serde_json::Value>,

    timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: TurnContent) -> Self {
        Self {
            role,
            content,
            native: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnContent::Text(text.into()))
    }

    /// Create an assistant turn carrying final text
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnContent::Text(text.into()))
    }

    /// Create an assistant turn carrying tool calls
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(Role::Assistant, TurnContent::ToolCalls(calls))
    }

    /// Create the single turn holding every result for one assistant turn
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(Role::ToolResult, TurnContent::ToolResults(results))
    }

    /// Attach the backend-native representation
    #[must_use]
    pub fn with_native(mut self, native: serde_json::Value) -> Self {
        self.native = Some(native);
        self
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn content(&self) -> &TurnContent {
        &self.content
    }

    pub const fn native(&self) -> Option<&serde_json::Value> {
        self.native.as_ref()
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Plain text of the turn, if it is a text turn
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Tool calls requested by this turn (empty for non-call turns)
    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.content {
            TurnContent::ToolCalls(calls) => calls,
            _ => &[],
        }
    }
}

/// Ordered, append-only turn history owned by exactly one session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    ///
    /// A tool-result turn must directly follow an assistant turn whose tool
    /// calls reference exactly the same ids.
    pub fn push(&mut self, turn: Turn) {
        debug_assert!(
            self.accepts(&turn),
            "tool results must answer the preceding assistant tool calls"
        );
        self.turns.push(turn);
    }

    fn accepts(&self, turn: &Turn) -> bool {
        let TurnContent::ToolResults(results) = &turn.content else {
            return true;
        };
        let Some(previous) = self.turns.last() else {
            return false;
        };
        let mut requested: Vec<&str> =
            previous.tool_calls().iter().map(|c| c.id.as_str()).collect();
        let mut answered: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        requested.sort_unstable();
        answered.sort_unstable();
        previous.role == Role::Assistant && requested == answered
    }

    /// Get all turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Get the last turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Arguments;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("Hello");
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.text(), Some("Hello"));
        assert!(turn.tool_calls().is_empty());
        assert!(turn.native().is_none());
    }

    #[test]
    fn test_conversation_keeps_order() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("list files"));
        conv.push(Turn::assistant_tool_calls(vec![
            ToolCall::new("a", "run_command", Arguments::new()),
            ToolCall::new("b", "read_file", Arguments::new()),
        ]));
        conv.push(Turn::tool_results(vec![
            ToolResult { id: "b".into(), name: "read_file".into(), output: "2".into() },
            ToolResult { id: "a".into(), name: "run_command".into(), output: "1".into() },
        ]));
        conv.push(Turn::assistant_text("done"));

        let roles: Vec<Role> = conv.turns().iter().map(Turn::role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::ToolResult, Role::Assistant]
        );
        assert_eq!(conv.last().and_then(Turn::text), Some("done"));
    }

    #[test]
    fn test_rejects_unmatched_results() {
        let mut conv = Conversation::new();
        conv.push(Turn::assistant_tool_calls(vec![ToolCall::new(
            "a",
            "run_command",
            Arguments::new(),
        )]));
        let stray = Turn::tool_results(vec![ToolResult {
            id: "z".into(),
            name: "run_command".into(),
            output: String::new(),
        }]);
        assert!(!conv.accepts(&stray));
    }
}
