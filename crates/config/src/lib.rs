//! Configuration loading and validation for StarBot.
//!
//! Loads configuration from `~/.starbot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.starbot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Where the stores live. Defaults to `~/.starbot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub automation: AutomationConfig,

    /// Settings for the model consulted by the automation decision module
    #[serde(default)]
    pub decision: DecisionConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("data_dir", &self.data_dir)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("automation", &self.automation)
            .field("decision", &self.decision)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Completion requests allowed per turn. Negative means unbounded.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: i64,

    /// Ask before running tools flagged dangerous
    #[serde(default)]
    pub confirm_dangerous: bool,

    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> i64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            confirm_dangerous: false,
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    /// The iteration bound as the agent loop consumes it. Negative means
    /// unbounded; values past `u32::MAX` saturate.
    pub fn iteration_limit(&self) -> Option<u32> {
        if self.max_iterations < 0 {
            return None;
        }
        u32::try_from(self.max_iterations.min(i64::from(u32::MAX))).ok()
    }
}

/// Conversation memory limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Ceiling on non-system messages before compaction
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Tool outputs longer than this are truncated head + tail
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,
}

fn default_max_history_messages() -> usize {
    80
}
fn default_max_tool_output_chars() -> usize {
    2400
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history_messages(),
            max_tool_output_chars: default_max_tool_output_chars(),
        }
    }
}

/// Scheduler daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Delay between scheduler passes
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Deliver desktop notifications for tasks that opt in
    #[serde(default = "default_true")]
    pub notify: bool,
}

fn default_tick_ms() -> u64 {
    1000
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            notify: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Falls back to the top-level key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Falls back to the top-level base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

impl std::fmt::Debug for DecisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionConfig")
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.starbot/config.toml),
    /// then apply `STARBOT_API_KEY`, `STARBOT_BASE_URL` and `STARBOT_MODEL`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_data_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(key) = get("STARBOT_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = get("STARBOT_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = get("STARBOT_MODEL") {
            self.model = model;
        }
    }

    /// `~/.starbot`
    pub fn default_data_dir() -> PathBuf {
        dirs_home().join(".starbot")
    }

    /// The directory holding the task, result, daemon and history stores.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::default_data_dir)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.memory.max_history_messages == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_history_messages must be > 0".into(),
            ));
        }
        if self.automation.tick_ms == 0 {
            return Err(ConfigError::ValidationError("automation.tick_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Key for the decision model, falling back to the chat key.
    pub fn decision_api_key(&self) -> Option<&str> {
        self.decision
            .api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }

    /// Base URL for the decision model, falling back to the chat endpoint.
    pub fn decision_base_url(&self) -> &str {
        self.decision.base_url.as_deref().unwrap_or(&self.base_url)
    }

    /// A default config TOML string (for `starbot init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            data_dir: None,
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            automation: AutomationConfig::default(),
            decision: DecisionConfig::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.agent.max_iterations, 30);
        assert!(!config.agent.confirm_dangerous);
        assert_eq!(config.memory.max_history_messages, 80);
        assert_eq!(config.memory.max_tool_output_chars, 2400);
        assert_eq!(config.automation.tick_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.memory.max_history_messages, 80);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model = "local-model"

[agent]
max_iterations = -1
confirm_dangerous = true
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "local-model");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert!(config.agent.confirm_dangerous);
        assert_eq!(config.agent.iteration_limit(), None);
        assert_eq!(config.memory.max_tool_output_chars, 2400);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = [unterminated").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("STARBOT_API_KEY", "sk-env"),
            ("STARBOT_MODEL", "gpt-4o-mini"),
            ("STARBOT_BASE_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn iteration_limit_conversion() {
        let mut agent = AgentConfig::default();
        assert_eq!(agent.iteration_limit(), Some(30));
        agent.max_iterations = 0;
        assert_eq!(agent.iteration_limit(), Some(0));
        agent.max_iterations = -5;
        assert_eq!(agent.iteration_limit(), None);
    }

    #[test]
    fn huge_iteration_limit_saturates_instead_of_unbounding() {
        let mut agent = AgentConfig::default();
        agent.max_iterations = i64::MAX;
        assert_eq!(agent.iteration_limit(), Some(u32::MAX));
        agent.max_iterations = i64::from(u32::MAX) + 1;
        assert_eq!(agent.iteration_limit(), Some(u32::MAX));
    }

    #[test]
    fn decision_settings_fall_back() {
        let mut config = AppConfig {
            api_key: Some("sk-main".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.decision_api_key(), Some("sk-main"));
        assert_eq!(config.decision_base_url(), "https://api.openai.com/v1");

        config.decision.api_key = Some("sk-decide".into());
        config.decision.base_url = Some("http://localhost:8080/v1".into());
        assert_eq!(config.decision_api_key(), Some("sk-decide"));
        assert_eq!(config.decision_base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.decision.api_key = Some("sk-other".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("sk-other"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn data_dir_override() {
        let config = AppConfig {
            data_dir: Some(PathBuf::from("/var/lib/starbot")),
            ..AppConfig::default()
        };
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/starbot"));
        assert!(AppConfig::default().data_dir().ends_with(".starbot"));
    }
}
