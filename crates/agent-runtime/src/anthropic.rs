//! Anthropic LLM Provider
//!
//! Implementation of `LlmProvider` for the Anthropic Messages API.

use agent_core::{
    Conversation, Turn, TurnContent,
    conversation::Role,
    error::Result,
    provider::{FinishReason, LlmProvider, ProviderResponse, ResponsePart, TokenUsage},
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{ProviderConfig, post_json};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Serialize)]
struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Anthropic LLM provider
pub struct AnthropicProvider {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    /// Create from configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            max_tokens: config.max_tokens,
        })
    }

    /// Convert one turn to an Anthropic message
    fn render_turn(turn: &Turn) -> Value {
        if let Some(native) = turn.native().filter(|n| n.get("content").is_some()) {
            return native.clone();
        }

        match (turn.role(), turn.content()) {
            (Role::User, TurnContent::Text(text)) => json!({ "role": "user", "content": text }),
            (_, TurnContent::Text(text)) => json!({
                "role": "assistant",
                "content": [{ "type": "text", "text": text }],
            }),
            (_, TurnContent::ToolCalls(calls)) => {
                let blocks: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        json!({
                            "type": "tool_use",
                            "id": c.id,
                            "name": c.name,
                            "input": c.arguments,
                        })
                    })
                    .collect();
                json!({ "role": "assistant", "content": blocks })
            }
            (_, TurnContent::ToolResults(results)) => {
                let blocks: Vec<Value> = results
                    .iter()
                    .map(|r| {
                        json!({ "type": "tool_result", "tool_use_id": r.id, "content": r.output })
                    })
                    .collect();
                json!({ "role": "user", "content": blocks })
            }
        }
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        system_prompt: &str,
    ) -> Result<Value> {
        let messages = conversation
            .turns()
            .iter()
            .map(Self::render_turn)
            // the API rejects messages without content
            .filter(|m| !is_empty_content(&m["content"]))
            .collect();

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: system_prompt,
            messages,
            tools: tools
                .iter()
                .map(|t| ToolDefinition {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.json_schema(),
                })
                .collect(),
        };
        Ok(serde_json::to_value(request)?)
    }

    fn parse_response(&self, body: Value) -> Result<ProviderResponse> {
        let parsed: MessagesResponse = serde_json::from_value(body)?;
        let parts = parsed.content.iter().filter_map(parse_block).collect();
        let native = json!({ "role": "assistant", "content": parsed.content });

        let mut response = ProviderResponse::new(
            parts,
            native,
            parsed.model.unwrap_or_else(|| self.model.clone()),
        );
        response.usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });
        response.finish_reason = parsed.stop_reason.map(|r| match r.as_str() {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolUse,
            "refusal" => FinishReason::ContentFilter,
            _ => FinishReason::Other(r),
        });
        Ok(response)
    }
}

fn is_empty_content(content: &Value) -> bool {
    match content {
        Value::String(s) => s.is_empty(),
        Value::Array(blocks) => blocks.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn parse_block(block: &Value) -> Option<ResponsePart> {
    match block.get("type")?.as_str()? {
        "text" => Some(ResponsePart::Text(block.get("text")?.as_str()?.to_string())),
        "tool_use" => {
            let arguments = match block.get("input") {
                Some(Value::Object(input)) => input.clone(),
                _ => Map::new(),
            };
            Some(ResponsePart::ToolCall(ToolCall::new(
                block.get("id")?.as_str()?,
                block.get("name")?.as_str()?,
                arguments,
            )))
        }
        _ => None,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        system_prompt: &str,
    ) -> Result<ProviderResponse> {
        let body = self.build_request(conversation, tools, system_prompt)?;
        let request = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);

        let answer = post_json(request, &body, "anthropic").await?;
        self.parse_response(answer)
    }
}
