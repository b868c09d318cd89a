//! Server Settings
//!
//! Resolved once at startup from the environment (optionally seeded by a
//! `.env` file). The agent core only ever sees the finished values.

use std::path::PathBuf;
use std::time::Duration;

use agent_core::{AgentError, reasoning::DEFAULT_SYSTEM_PROMPT, tool::ToolExecutor};
use agent_runtime::{ProviderConfig, ProviderKind};
use thiserror::Error;

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("missing credential: set AGENT_API_KEY or {0}")]
    MissingCredential(&'static str),

    #[error("failed to read prompt library {path}: {source}")]
    PromptLibrary {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("prompt library {0} has no string \"default\" entry")]
    PromptLibraryFormat(PathBuf),

    #[error(transparent)]
    Provider(#[from] AgentError),
}

/// Fully resolved settings
#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub provider: ProviderKind,
    pub model: String,
    pub credential: String,
    pub endpoint: Option<String>,
    pub system_prompt: String,
    pub max_rounds: Option<usize>,
    pub command_timeout: Duration,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credential", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("max_rounds", &self.max_rounds)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 9100;

    /// Load from the process environment
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match var("AGENT_PROVIDER") {
            Some(name) => name.parse::<ProviderKind>()?,
            None => ProviderKind::Gemini,
        };

        let credential = var("AGENT_API_KEY")
            .or_else(|| var(provider.api_key_var()))
            .ok_or(SettingsError::MissingCredential(provider.api_key_var()))?;

        let system_prompt = match (var("AGENT_SYSTEM_PROMPT"), var("AGENT_PROMPT_LIBRARY")) {
            (Some(prompt), _) => prompt,
            (None, Some(path)) => load_prompt_library(PathBuf::from(path))?,
            (None, None) => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Ok(Self {
            host: var("AGENT_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.into()),
            port: parse_or("AGENT_PORT", var("AGENT_PORT"), Self::DEFAULT_PORT)?,
            provider,
            model: var("AGENT_MODEL").unwrap_or_else(|| provider.default_model().into()),
            credential,
            endpoint: var("AGENT_API_ENDPOINT"),
            system_prompt,
            max_rounds: var("AGENT_MAX_ROUNDS")
                .map(|v| parse_or("AGENT_MAX_ROUNDS", Some(v), 0))
                .transpose()?,
            command_timeout: Duration::from_secs(parse_or(
                "AGENT_COMMAND_TIMEOUT_SECS",
                var("AGENT_COMMAND_TIMEOUT_SECS"),
                ToolExecutor::DEFAULT_COMMAND_TIMEOUT.as_secs(),
            )?),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(&self.model, &self.credential);
        config.endpoint.clone_from(&self.endpoint);
        config
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, SettingsError> {
    value.map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .map_err(|_| SettingsError::Invalid { var, value: v })
    })
}

/// Read the `"default"` prompt out of a JSON prompt library
fn load_prompt_library(path: PathBuf) -> Result<String, SettingsError> {
    let raw = std::fs::read_to_string(&path).map_err(|source| SettingsError::PromptLibrary {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .and_then(|library| library.get("default")?.as_str().map(str::to_string))
        .ok_or(SettingsError::PromptLibraryFormat(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[("GEMINI_API_KEY", "g-key")]).unwrap();
        assert_eq!(settings.bind_addr(), "127.0.0.1:9100");
        assert_eq!(settings.provider, ProviderKind::Gemini);
        assert_eq!(settings.model, ProviderKind::Gemini.default_model());
        assert_eq!(settings.credential, "g-key");
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.max_rounds, None);
        assert_eq!(settings.command_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_overrides() {
        let settings = load(&[
            ("AGENT_PROVIDER", "anthropic"),
            ("AGENT_API_KEY", "k"),
            ("AGENT_HOST", "0.0.0.0"),
            ("AGENT_PORT", "7000"),
            ("AGENT_MODEL", "claude-x"),
            ("AGENT_SYSTEM_PROMPT", "be terse"),
            ("AGENT_MAX_ROUNDS", "25"),
            ("AGENT_COMMAND_TIMEOUT_SECS", "5"),
            ("AGENT_API_ENDPOINT", "http://localhost:1234"),
        ])
        .unwrap();
        assert_eq!(settings.bind_addr(), "0.0.0.0:7000");
        assert_eq!(settings.provider, ProviderKind::Anthropic);
        assert_eq!(settings.system_prompt, "be terse");
        assert_eq!(settings.max_rounds, Some(25));
        assert_eq!(settings.command_timeout, Duration::from_secs(5));

        let config = settings.provider_config();
        assert_eq!(config.model, "claude-x");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:1234"));
    }

    #[test]
    fn test_missing_credential() {
        let err = load(&[("AGENT_PROVIDER", "anthropic")]).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("AGENT_API_KEY", "k"), ("AGENT_PORT", "http")]),
            Err(SettingsError::Invalid { var: "AGENT_PORT", .. })
        ));
        assert!(matches!(
            load(&[("AGENT_API_KEY", "k"), ("AGENT_PROVIDER", "ollama")]),
            Err(SettingsError::Provider(_))
        ));
    }

    #[test]
    fn test_prompt_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt_library.json");
        std::fs::write(&path, r#"{"default": "library prompt", "other": "x"}"#).unwrap();

        let settings = load(&[
            ("AGENT_API_KEY", "k"),
            ("AGENT_PROMPT_LIBRARY", path.to_str().unwrap()),
        ])
        .unwrap();
        assert_eq!(settings.system_prompt, "library prompt");

        std::fs::write(&path, r#"{"other": "x"}"#).unwrap();
        assert!(matches!(
            load(&[("AGENT_API_KEY", "k"), ("AGENT_PROMPT_LIBRARY", path.to_str().unwrap())]),
            Err(SettingsError::PromptLibraryFormat(_))
        ));
    }

    #[test]
    fn test_debug_redacts_credential() {
        let settings = load(&[("AGENT_API_KEY", "very-secret")]).unwrap();
        assert!(!format!("{settings:?}").contains("very-secret"));
    }
}
