//! Scripted provider for tests.
//!
//! Replays canned responses in order and records every capability call, so
//! tests can assert exactly how the loop drove the provider.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::conversation::{Conversation, Turn};
use crate::error::{AgentError, Result};
use crate::provider::{LlmProvider, ProviderResponse, ResponsePart};
use crate::tool::{ToolCall, ToolResult, ToolSchema};

/// A recorded capability call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderCall {
    Invoke { turns: usize },
    AppendAssistant,
    AppendToolResults { ids: Vec<String> },
}

#[derive(Default)]
struct Recorder {
    script: Vec<ProviderResponse>,
    next: usize,
    calls: Vec<ProviderCall>,
    system_prompts: Vec<String>,
}

/// Provider that answers from a fixed script and fails once it runs out
pub struct ScriptedProvider {
    inner: Mutex<Recorder>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ProviderResponse>) -> Self {
        Self {
            inner: Mutex::new(Recorder {
                script,
                ..Recorder::default()
            }),
        }
    }

    /// A final-answer response
    pub fn text(text: &str) -> ProviderResponse {
        ProviderResponse::new(
            vec![ResponsePart::Text(text.to_string())],
            json!({ "text": text }),
            "scripted",
        )
    }

    /// A response requesting the given `(id, name, arguments)` tool calls
    pub fn tool_calls(calls: Vec<(&str, &str, Value)>) -> ProviderResponse {
        let parts = calls
            .into_iter()
            .map(|(id, name, args)| {
                let arguments = match args {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                ResponsePart::ToolCall(ToolCall::new(id, name, arguments))
            })
            .collect();
        ProviderResponse::new(parts, json!({ "tool_calls": true }), "scripted")
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every capability call so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Number of `invoke` calls so far
    pub fn invocations(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProviderCall::Invoke { .. }))
            .count()
    }

    /// System prompts received by `invoke`
    pub fn system_prompts(&self) -> Vec<String> {
        self.lock().system_prompts.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        _tools: &[ToolSchema],
        system_prompt: &str,
    ) -> Result<ProviderResponse> {
        let mut inner = self.lock();
        inner.calls.push(ProviderCall::Invoke {
            turns: conversation.len(),
        });
        inner.system_prompts.push(system_prompt.to_string());

        let index = inner.next;
        inner.next += 1;
        inner
            .script
            .get(index)
            .cloned()
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))
    }

    fn append_assistant_turn(&self, conversation: &mut Conversation, response: &ProviderResponse) {
        self.lock().calls.push(ProviderCall::AppendAssistant);
        let calls = self.extract_tool_calls(response);
        let turn = if calls.is_empty() {
            Turn::assistant_text(self.extract_final_text(response))
        } else {
            Turn::assistant_tool_calls(calls)
        };
        conversation.push(turn.with_native(response.native.clone()));
    }

    fn append_tool_result_turn(&self, conversation: &mut Conversation, results: Vec<ToolResult>) {
        self.lock().calls.push(ProviderCall::AppendToolResults {
            ids: results.iter().map(|r| r.id.clone()).collect(),
        });
        conversation.push(Turn::tool_results(results));
    }
}
