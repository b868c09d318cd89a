//! Reasoning Loop
//!
//! Alternates between the model and the tool executor until the model
//! produces a turn without tool calls.
//!
//! ```text
//! AwaitingModel ──(tool calls)──▶ ExecutingTools ──▶ AwaitingModel
//!       │
//!       └──(no tool calls)──▶ Done(text)
//! ```

use std::sync::Arc;

use crate::conversation::Conversation;
use crate::error::{AgentError, Result};
use crate::provider::LlmProvider;
use crate::tool::{ToolCall, ToolExecutor, ToolSchema};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt sent with every call
    pub system_prompt: String,

    /// Optional cap on model rounds per user message; `None` is unbounded
    pub max_rounds: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_rounds: None,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable assistant running on a remote server. \
You can run shell commands, create files and read files with the provided tools. \
Use them when the request needs it, then answer concisely.";

/// Where the loop currently stands
#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

/// The main Agent struct, shared read-only by every session
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolExecutor>,
    schemas: Vec<ToolSchema>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolExecutor>,
        config: AgentConfig,
    ) -> Self {
        let schemas = tools.schemas();
        Self {
            provider,
            tools,
            schemas,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, Arc::new(ToolExecutor::new()), AgentConfig::default())
    }

    /// Drive the loop to completion.
    ///
    /// `conversation` must already end with the newest user turn. Provider
    /// errors propagate as-is and the conversation keeps whatever turns were
    /// appended before the failure.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<String> {
        let mut state = LoopState::AwaitingModel;
        let mut rounds = 0;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    rounds += 1;
                    if let Some(max) = self.config.max_rounds {
                        if rounds > max {
                            return Err(AgentError::MaxIterations(max));
                        }
                    }

                    let response = self
                        .provider
                        .invoke(conversation, &self.schemas, &self.config.system_prompt)
                        .await?;
                    tracing::debug!(
                        provider = self.provider.name(),
                        model = %response.model,
                        round = rounds,
                        usage = ?response.usage,
                        "Model responded"
                    );

                    // Every model turn is appended, final answers included.
                    self.provider.append_assistant_turn(conversation, &response);

                    let calls = self.provider.extract_tool_calls(&response);
                    if calls.is_empty() {
                        LoopState::Done(self.provider.extract_final_text(&response))
                    } else {
                        LoopState::ExecutingTools(calls)
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(self.tools.run(call).await);
                    }
                    self.provider.append_tool_result_turn(conversation, results);
                    LoopState::AwaitingModel
                }
                LoopState::Done(text) => return Ok(text),
            };
        }
    }

    /// Get the tool executor
    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Name of the active provider
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolExecutor,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolExecutor::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolExecutor) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn max_rounds(mut self, max: Option<usize>) -> Self {
        self.config.max_rounds = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, Turn, TurnContent};
    use crate::testing::{ProviderCall, ScriptedProvider};
    use serde_json::json;

    fn agent(provider: &Arc<ScriptedProvider>) -> Agent {
        AgentBuilder::new()
            .provider(provider.clone())
            .system_prompt("be brief")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_direct_answer_invokes_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text("hi there")]));
        let mut conv = Conversation::new();
        conv.push(Turn::user("hello"));

        let reply = agent(&provider).run(&mut conv).await.unwrap();

        assert_eq!(reply, "hi there");
        assert_eq!(
            provider.calls(),
            [ProviderCall::Invoke { turns: 1 }, ProviderCall::AppendAssistant]
        );
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().unwrap().role(), Role::Assistant);
        assert_eq!(provider.system_prompts(), ["be brief"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_two_tool_calls_run_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_calls(vec![
                ("c1", "run_command", json!({"command": "echo first"})),
                ("c2", "run_command", json!({"command": "echo second"})),
            ]),
            ScriptedProvider::text("both ran"),
        ]));
        let mut conv = Conversation::new();
        conv.push(Turn::user("run two things"));

        let reply = agent(&provider).run(&mut conv).await.unwrap();

        assert_eq!(reply, "both ran");
        assert_eq!(
            provider.calls(),
            [
                ProviderCall::Invoke { turns: 1 },
                ProviderCall::AppendAssistant,
                ProviderCall::AppendToolResults {
                    ids: vec!["c1".into(), "c2".into()]
                },
                ProviderCall::Invoke { turns: 3 },
                ProviderCall::AppendAssistant,
            ]
        );

        let TurnContent::ToolResults(results) = conv.turns()[2].content() else {
            panic!("expected tool results turn");
        };
        assert_eq!(results[0].output, "first\n\n[exit code: 0]");
        assert_eq!(results[1].output, "second\n\n[exit code: 0]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_later_call_sees_earlier_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("note.txt");
        let path = path.to_str().unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_calls(vec![
                ("w", "create_file", json!({"path": path, "content": "written first"})),
                ("r", "read_file", json!({"path": path})),
                ("c", "run_command", json!({"command": format!("cat {path} && rm {path}")})),
            ]),
            ScriptedProvider::text("done"),
        ]));
        let mut conv = Conversation::new();
        conv.push(Turn::user("write then read"));

        agent(&provider).run(&mut conv).await.unwrap();

        let TurnContent::ToolResults(results) = conv.turns()[2].content() else {
            panic!("expected tool results turn");
        };
        assert_eq!(results[0].output, format!("File created: {path}"));
        assert_eq!(results[1].output, "written first");
        assert_eq!(results[2].output, "written first\n[exit code: 0]");
        assert!(!std::path::Path::new(path).exists());
    }

    #[tokio::test]
    async fn test_provider_error_keeps_partial_conversation() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::tool_calls(vec![(
            "x",
            "no_such_tool",
            json!({}),
        )])]));
        let mut conv = Conversation::new();
        conv.push(Turn::user("go"));

        let err = agent(&provider).run(&mut conv).await.unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        // user, assistant tool call, tool result; the failed second call adds nothing
        assert_eq!(conv.len(), 3);
        let TurnContent::ToolResults(results) = conv.last().unwrap().content() else {
            panic!("expected tool results turn");
        };
        assert_eq!(results[0].output, "[error: unknown tool no_such_tool]");
    }

    #[tokio::test]
    async fn test_round_cap() {
        let looping = (0..5)
            .map(|_| ScriptedProvider::tool_calls(vec![("c", "read_file", json!({}))]))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(looping));
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .max_rounds(Some(2))
            .build()
            .unwrap();
        let mut conv = Conversation::new();
        conv.push(Turn::user("loop"));

        let err = agent.run(&mut conv).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
        assert_eq!(provider.invocations(), 2);
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(
            AgentBuilder::new().build(),
            Err(AgentError::Config(_))
        ));
    }
}
