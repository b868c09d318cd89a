//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool name is not one of the fixed tool set
    #[error("unknown tool {0}")]
    ToolNotFound(String),

    /// Tool arguments failed validation
    #[error("{0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("{0}")]
    ToolExecution(String),

    /// Round cap reached in the agent loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Malformed provider payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Map a non-success HTTP status from a backend onto an error variant
    pub fn from_status(status: u16, body: &str, provider: &str) -> Self {
        let detail = format!("{provider} returned {status}: {body}");
        match status {
            429 => Self::RateLimited(detail),
            401 | 403 => Self::Auth(detail),
            500..=599 => Self::ProviderUnavailable(detail),
            _ => Self::Provider(detail),
        }
    }
}
