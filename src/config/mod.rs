//! Configuration: serde-defaulted structs, optionally overridden by a
//! `webagent.toml` next to the working directory. CLI flags override file
//! values; the hard-coded fallbacks are the original deployment defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "webagent.toml";

/// Model generation parameters passed into the Decision Engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-4o".to_string(),
            temperature: 1.0,
            max_tokens: 2000,
            request_timeout_secs: 120,
        }
    }
}

/// Control-loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Action budget per task.
    pub max_actions: u32,
    /// How many log entries to feed back into the prompt; 0 disables history.
    pub history_window: usize,
    /// Cap on the `(id -> visible text)` grounding sample in the system block.
    pub element_sample: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_actions: 40,
            history_window: 0,
            element_sample: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Completion backend: `openai` (primary, vision) or `baseten`.
    pub provider: ProviderChoice,
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub gateway: GatewayConfig,
    /// Browser sidecar base URL the agent opens sessions against.
    pub browser_url: BrowserUrl,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ProviderChoice(pub String);

impl Default for ProviderChoice {
    fn default() -> Self {
        Self("openai".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BrowserUrl(pub String);

impl Default for BrowserUrl {
    fn default() -> Self {
        Self("http://127.0.0.1:8700/".to_string())
    }
}

impl Config {
    /// Load `webagent.toml` from the working directory if present, otherwise
    /// fall back to defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_match_original_deployment() {
        let config = Config::default();
        assert_eq!(config.model.name, "gpt-4o");
        assert!((config.model.temperature - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.model.max_tokens, 2000);
        assert_eq!(config.model.request_timeout_secs, 120);
        assert_eq!(config.agent.max_actions, 40);
        assert_eq!(config.agent.history_window, 0);
        assert_eq!(config.provider.0, "openai");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/webagent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "provider = \"baseten\"\n\n[agent]\nmax_actions = 12\n"
        )
        .unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.provider.0, "baseten");
        assert_eq!(config.agent.max_actions, 12);
        // untouched sections keep defaults
        assert_eq!(config.model.name, "gpt-4o");
        assert_eq!(config.agent.history_window, 0);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = [not toml").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
