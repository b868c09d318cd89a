//! # agent-runtime
//!
//! Concrete LLM backends for the agent loop.
//!
//! ## Providers
//!
//! - **Gemini** (default): Google `generateContent` with function declarations
//! - **Anthropic**: Messages API with `tool_use` / `tool_result` blocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{ProviderConfig, ProviderKind, build_provider};
//!
//! let provider = build_provider(ProviderKind::Gemini, &ProviderConfig::new(model, key))?;
//! let agent = AgentBuilder::new().provider(provider).build()?;
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{AgentError, LlmProvider, Result};

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "gemini")]
pub use gemini::GeminiProvider;

// Re-export core types for convenience
pub use agent_core::{Agent, AgentBuilder, Conversation, Session, ToolExecutor};

/// Which backend protocol to speak
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
}

impl ProviderKind {
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::Anthropic => "claude-sonnet-4-5",
        }
    }

    /// Provider-specific environment variable holding a credential
    pub const fn api_key_var(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(AgentError::Config(format!("unknown provider '{other}'"))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Provider configuration
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Model identifier
    pub model: String,

    /// Credential sent with every request
    pub api_key: String,

    /// Override for the backend base URL
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate (Anthropic requires it)
    pub max_tokens: u32,
}

impl ProviderConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            endpoint: None,
            timeout_secs: 120,
            max_tokens: 8192,
        }
    }

    /// Build the HTTP client shared by every session using this provider
    fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("http client error: {e}")))
    }
}

/// Construct the provider for `kind`
pub fn build_provider(kind: ProviderKind, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    if config.api_key.trim().is_empty() {
        return Err(AgentError::Config(format!("missing {kind} API key")));
    }

    match kind {
        #[cfg(feature = "gemini")]
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::from_config(config)?)),
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::from_config(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(AgentError::Config(format!(
            "provider '{other}' is not compiled in"
        ))),
    }
}

/// POST a JSON body and decode the JSON answer, classifying failures
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
    provider: &str,
) -> Result<serde_json::Value> {
    let resp = request.json(body).send().await.map_err(|e| {
        if e.is_timeout() || e.is_connect() {
            AgentError::ProviderUnavailable(format!("{provider} request error: {e}"))
        } else {
            AgentError::Provider(format!("{provider} request error: {e}"))
        }
    })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AgentError::from_status(status.as_u16(), &body, provider));
    }

    resp.json()
        .await
        .map_err(|e| AgentError::Parse(format!("{provider} response parse error: {e}")))
}
