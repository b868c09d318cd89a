//! LLM Provider Strategy Pattern
//!
//! Defines the capability set every backend adapter offers. The agent loop is
//! written against this trait only and never asks which backend it is using.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::LlmProvider;
//!
//! let response = provider.invoke(&conversation, &tools, system_prompt).await?;
//! provider.append_assistant_turn(&mut conversation, &response);
//! if provider.extract_tool_calls(&response).is_empty() {
//!     return Ok(provider.extract_final_text(&response));
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, Turn};
use crate::error::Result;
use crate::tool::{ToolCall, ToolResult, ToolSchema};

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Other(String),
}

/// One ordered segment of a model turn
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePart {
    Text(String),
    ToolCall(ToolCall),
}

/// A model turn, parsed once when the backend answers
#[derive(Clone, Debug)]
pub struct ProviderResponse {
    /// Segments in the order the model produced them
    pub parts: Vec<ResponsePart>,

    /// Backend-native form of the turn, echoed back on the next call
    pub native: serde_json::Value,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl ProviderResponse {
    pub fn new(
        parts: Vec<ResponsePart>,
        native: serde_json::Value,
        model: impl Into<String>,
    ) -> Self {
        Self {
            parts,
            native,
            model: model.into(),
            usage: None,
            finish_reason: None,
        }
    }
}

/// Strategy trait for LLM providers
///
/// `invoke` is the only method a backend must write; the remaining
/// capabilities have defaults that work on the parsed [`ProviderResponse`]
/// and keep the native turn attached for verbatim echoing.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Send the whole conversation, tool schema and system prompt
    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        system_prompt: &str,
    ) -> Result<ProviderResponse>;

    /// Tool calls in model order; empty means a final answer is available
    fn extract_tool_calls(&self, response: &ProviderResponse) -> Vec<ToolCall> {
        response
            .parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::ToolCall(call) => Some(call.clone()),
                ResponsePart::Text(_) => None,
            })
            .collect()
    }

    /// All text segments joined by newlines; empty if the model sent none
    fn extract_final_text(&self, response: &ProviderResponse) -> String {
        response
            .parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                ResponsePart::ToolCall(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Append the model's own turn in the shape the backend expects back
    fn append_assistant_turn(&self, conversation: &mut Conversation, response: &ProviderResponse) {
        let calls = self.extract_tool_calls(response);
        let turn = if calls.is_empty() {
            Turn::assistant_text(self.extract_final_text(response))
        } else {
            Turn::assistant_tool_calls(calls)
        };
        conversation.push(turn.with_native(response.native.clone()));
    }

    /// Append every result for the previous assistant turn as one turn
    fn append_tool_result_turn(&self, conversation: &mut Conversation, results: Vec<ToolResult>) {
        conversation.push(Turn::tool_results(results));
    }
}
