//! Gemini LLM Provider
//!
//! Implementation of `LlmProvider` for Google's `generateContent` API with
//! function calling.

use agent_core::{
    Conversation, Turn, TurnContent,
    conversation::Role,
    error::{AgentError, Result},
    provider::{FinishReason, LlmProvider, ProviderResponse, ResponsePart, TokenUsage},
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{ProviderConfig, post_json};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Gemini LLM provider
pub struct GeminiProvider {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl GeminiProvider {
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
        })
    }

    /// Convert one turn to a Gemini `Content`
    fn render_turn(turn: &Turn) -> Value {
        if let Some(native) = turn.native().filter(|n| n.get("parts").is_some()) {
            return native.clone();
        }

        match (turn.role(), turn.content()) {
            (Role::User, TurnContent::Text(text)) => {
                json!({ "role": "user", "parts": [{ "text": text }] })
            }
            (_, TurnContent::Text(text)) => {
                json!({ "role": "model", "parts": [{ "text": text }] })
            }
            (_, TurnContent::ToolCalls(calls)) => {
                let parts: Vec<Value> = calls
                    .iter()
                    .map(|c| json!({ "functionCall": { "name": c.name, "args": c.arguments } }))
                    .collect();
                json!({ "role": "model", "parts": parts })
            }
            (_, TurnContent::ToolResults(results)) => {
                let parts: Vec<Value> = results
                    .iter()
                    .map(|r| {
                        json!({
                            "functionResponse": {
                                "name": r.name,
                                "response": { "result": r.output },
                            }
                        })
                    })
                    .collect();
                json!({ "role": "user", "parts": parts })
            }
        }
    }

    fn build_request(
        conversation: &Conversation,
        tools: &[ToolSchema],
        system_prompt: &str,
    ) -> Result<Value> {
        let request = GenerateContentRequest {
            contents: conversation
                .turns()
                .iter()
                .map(Self::render_turn)
                // blank answers (MAX_TOKENS, SAFETY) have no parts, which the API rejects
                .filter(|c| c["parts"].as_array().is_some_and(|parts| !parts.is_empty()))
                .collect(),
            system_instruction: (!system_prompt.is_empty())
                .then(|| json!({ "parts": [{ "text": system_prompt }] })),
            tools: if tools.is_empty() {
                Vec::new()
            } else {
                vec![ToolDeclarations {
                    function_declarations: tools
                        .iter()
                        .map(|t| FunctionDeclaration {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.json_schema(),
                        })
                        .collect(),
                }]
            },
        };
        Ok(serde_json::to_value(request)?)
    }

    /// Parse the first candidate into ordered parts
    fn parse_response(&self, body: Value) -> Result<ProviderResponse> {
        let parsed: GenerateContentResponse = serde_json::from_value(body)?;
        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            AgentError::Provider("gemini returned no candidates".into())
        })?;

        let mut native = candidate
            .content
            .unwrap_or_else(|| json!({ "role": "model", "parts": [] }));
        if let Some(obj) = native.as_object_mut() {
            obj.entry("role").or_insert_with(|| json!("model"));
            obj.entry("parts").or_insert_with(|| json!([]));
        }

        let parts = native["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(parse_part).collect())
            .unwrap_or_default();

        let mut response = ProviderResponse::new(
            parts,
            native,
            parsed.model_version.unwrap_or_else(|| self.model.clone()),
        );
        response.usage = parsed.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });
        response.finish_reason = candidate.finish_reason.map(|r| match r.as_str() {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                FinishReason::ContentFilter
            }
            _ => FinishReason::Other(r),
        });
        Ok(response)
    }
}

fn parse_part(part: &Value) -> Option<ResponsePart> {
    if let Some(call) = part.get("functionCall") {
        let name = call.get("name")?.as_str()?;
        let arguments = match call.get("args") {
            Some(Value::Object(args)) => args.clone(),
            _ => Map::new(),
        };
        let id = call
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        return Some(ResponsePart::ToolCall(ToolCall::new(id, name, arguments)));
    }

    if part.get("thought").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    part.get("text")
        .and_then(Value::as_str)
        .map(|text| ResponsePart::Text(text.to_string()))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        system_prompt: &str,
    ) -> Result<ProviderResponse> {
        let body = Self::build_request(conversation, tools, system_prompt)?;
        let request = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.endpoint.trim_end_matches('/'),
                self.model
            ))
            .header("x-goog-api-key", &self.api_key);

        let answer = post_json(request, &body, "gemini").await?;
        self.parse_response(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request_body, serve_once};
    use agent_core::{ToolExecutor, ToolResult};

    fn provider(endpoint: Option<String>) -> GeminiProvider {
        let mut config = ProviderConfig::new("gemini-test", "secret");
        config.endpoint = endpoint;
        GeminiProvider::from_config(&config).unwrap()
    }

    const TOOL_CALL_RESPONSE: &str = r#"{
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "Let me look.", "thoughtSignature": "sig"},
                    {"functionCall": {"name": "run_command", "args": {"command": "ls"}}},
                    {"functionCall": {"id": "fc-2", "name": "read_file", "args": {"path": "a.txt"}}}
                ]
            },
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
    }"#;

    #[test]
    fn test_parse_tool_calls() {
        let gemini = provider(None);
        let response = gemini
            .parse_response(serde_json::from_str(TOOL_CALL_RESPONSE).unwrap())
            .unwrap();

        let calls = gemini.extract_tool_calls(&response);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "run_command");
        assert_eq!(calls[0].arguments["command"], "ls");
        assert!(!calls[0].id.is_empty());
        assert_eq!(calls[1].id, "fc-2");
        assert_eq!(gemini.extract_final_text(&response), "Let me look.");
        assert_eq!(response.usage.as_ref().map(|u| u.total_tokens), Some(15));
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_thoughts_are_not_answer_text() {
        let gemini = provider(None);
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"text": "pondering", "thought": true},
                {"text": "line one"},
                {"text": "line two"}
            ]}}]
        });
        let response = gemini.parse_response(body).unwrap();
        assert!(gemini.extract_tool_calls(&response).is_empty());
        assert_eq!(gemini.extract_final_text(&response), "line one\nline two");
        assert_eq!(response.native["role"], "model");
    }

    #[test]
    fn test_no_candidates_is_an_error() {
        let result =
            provider(None).parse_response(json!({"promptFeedback": {"blockReason": "SAFETY"}}));
        assert!(matches!(result, Err(AgentError::Provider(_))));
    }

    #[test]
    fn test_native_turn_is_echoed_and_results_grouped() {
        let gemini = provider(None);
        let response = gemini
            .parse_response(serde_json::from_str(TOOL_CALL_RESPONSE).unwrap())
            .unwrap();
        let calls = gemini.extract_tool_calls(&response);

        let mut conv = Conversation::new();
        conv.push(Turn::user("list files"));
        gemini.append_assistant_turn(&mut conv, &response);
        gemini.append_tool_result_turn(
            &mut conv,
            calls
                .iter()
                .map(|c| ToolResult {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    output: "ok".into(),
                })
                .collect(),
        );

        let tools = ToolExecutor::new().schemas();
        let request = GeminiProvider::build_request(&conv, &tools, "sys").unwrap();
        let contents = request["contents"].as_array().unwrap();

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0], json!({"role": "user", "parts": [{"text": "list files"}]}));
        assert_eq!(contents[1]["parts"][0]["thoughtSignature"], "sig");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][1]["functionResponse"]["name"], "read_file");
        assert_eq!(contents[2]["parts"][1]["functionResponse"]["response"]["result"], "ok");
        assert_eq!(request["systemInstruction"]["parts"][0]["text"], "sys");
        let declarations = request["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(declarations.len(), 3);
        assert_eq!(declarations[0]["parameters"]["required"], json!(["command"]));
    }

    #[test]
    fn test_blank_answer_is_not_sent_back() {
        let gemini = provider(None);
        let response = gemini
            .parse_response(json!({
                "candidates": [{"content": {"role": "model"}, "finishReason": "MAX_TOKENS"}]
            }))
            .unwrap();
        assert_eq!(gemini.extract_final_text(&response), "");
        assert_eq!(response.finish_reason, Some(FinishReason::Length));

        let mut conv = Conversation::new();
        conv.push(Turn::user("hi"));
        gemini.append_assistant_turn(&mut conv, &response);
        conv.push(Turn::user("again"));
        assert_eq!(conv.len(), 3);

        let request = GeminiProvider::build_request(&conv, &[], "").unwrap();
        assert_eq!(
            request["contents"],
            json!([
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "user", "parts": [{"text": "again"}]}
            ])
        );
    }

    #[tokio::test]
    async fn test_invoke_over_http() {
        let (url, server) = serve_once(
            200,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"hello"}]},
                "finishReason":"STOP"}]}"#,
        )
        .await;
        let gemini = provider(Some(url));
        let mut conv = Conversation::new();
        conv.push(Turn::user("hi"));

        let response = gemini.invoke(&conv, &[], "").await.unwrap();
        let raw = server.await.unwrap();

        assert_eq!(gemini.extract_final_text(&response), "hello");
        assert!(raw.starts_with("POST /models/gemini-test:generateContent"));
        assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: secret"));
        let sent = request_body(&raw);
        assert_eq!(sent["contents"][0]["parts"][0]["text"], "hi");
        assert!(sent.get("systemInstruction").is_none());
        assert!(sent.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let (url, server) = serve_once(429, r#"{"error":"quota"}"#).await;
        let gemini = provider(Some(url));
        let mut conv = Conversation::new();
        conv.push(Turn::user("hi"));

        let err = gemini.invoke(&conv, &[], "").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, AgentError::RateLimited(_)));
    }
}
