//! Configuration for the Panacloud chat wiring
//!
//! Settings come from three places, later ones winning: built-in defaults,
//! an optional TOML file, and `PANACLOUD_*` environment variables. A `.env`
//! file in the working directory is loaded first so its variables take
//! part in the lookup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AgentsError, Result};
use crate::model::ModelProvider;
use crate::provider::{openai_client, ChatCompletionsModel, GEMINI_OPENAI_BASE_URL};
use crate::runner::RunConfig;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "PANACLOUD_CONFIG";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderSettings,
    pub run: RunSettings,
    pub chat: ChatSettings,
    pub server: ServerSettings,
}

/// Where and how to reach the model.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Key given directly in the config file. Takes precedence over
    /// `api_key_env` when non-blank.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Model name sent with every request
    pub model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            base_url: GEMINI_OPENAI_BASE_URL.to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ProviderSettings {
    /// Resolves the API key. Blank values count as missing.
    pub fn api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| lookup(&self.api_key_env))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentsError::MissingApiKey {
                var: self.api_key_env.clone(),
            })
    }
}

/// Defaults applied to every agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub max_turns: usize,
    pub tracing_disabled: bool,
    pub temperature: Option<f32>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_turns: 10,
            tracing_disabled: true,
            temperature: None,
        }
    }
}

/// How chat handlers relay replies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Relay text deltas as they arrive instead of one final token
    pub streaming: bool,
    /// Feed the whole session history to every run
    pub track_history: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            streaming: true,
            track_history: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            session_idle_secs: 1800,
        }
    }
}

fn parse_flag(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AgentsError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            var, other
        ))),
    }
}

impl AppConfig {
    /// Loads `.env`, then the TOML file at `path` (or `$PANACLOUD_CONFIG`),
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded .env");
        }

        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;

        info!(
            model = %config.provider.model,
            base_url = %config.provider.base_url,
            streaming = config.chat.streaming,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = toml::from_str(&contents)?;
        debug!(path = %path.as_ref().display(), "Read config file");
        Ok(config)
    }

    /// Applies `PANACLOUD_*` overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(model) = lookup("PANACLOUD_MODEL") {
            self.provider.model = model;
        }
        if let Some(base_url) = lookup("PANACLOUD_BASE_URL") {
            self.provider.base_url = base_url;
        }
        if let Some(max_turns) = lookup("PANACLOUD_MAX_TURNS") {
            self.run.max_turns = max_turns.trim().parse().map_err(|_| {
                AgentsError::ConfigError(format!(
                    "PANACLOUD_MAX_TURNS must be a positive integer, got '{}'",
                    max_turns
                ))
            })?;
        }
        if let Some(bind) = lookup("PANACLOUD_BIND") {
            self.server.bind = bind;
        }
        if let Some(streaming) = lookup("PANACLOUD_STREAMING") {
            self.chat.streaming = parse_flag("PANACLOUD_STREAMING", &streaming)?;
        }
        if let Some(tracing) = lookup("PANACLOUD_TRACING") {
            self.run.tracing_disabled = !parse_flag("PANACLOUD_TRACING", &tracing)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.run.max_turns == 0 {
            return Err(AgentsError::ConfigError(
                "max_turns must be at least 1".to_string(),
            ));
        }
        if self.server.session_idle_secs == 0 {
            return Err(AgentsError::ConfigError(
                "session_idle_secs must be at least 1".to_string(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(AgentsError::ConfigError("model must not be empty".to_string()));
        }
        Ok(())
    }

    /// Builds the chat-completions model from the process environment.
    pub fn model_handle(&self) -> Result<Arc<dyn ModelProvider>> {
        self.model_handle_with(|key| std::env::var(key).ok())
    }

    pub fn model_handle_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Arc<dyn ModelProvider>> {
        let api_key = self.provider.api_key(lookup)?;
        let client = openai_client(&api_key, &self.provider.base_url);
        Ok(Arc::new(ChatCompletionsModel::new(
            self.provider.model.clone(),
            client,
        )))
    }

    /// Run configuration bound to `model`.
    pub fn run_config(&self, model: Arc<dyn ModelProvider>) -> RunConfig {
        RunConfig {
            model: Some(model),
            max_turns: self.run.max_turns,
            tracing_disabled: self.run.tracing_disabled,
            temperature: self.run.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.provider.api_key_env, "GEMINI_API_KEY");
        assert_eq!(
            config.provider.base_url,
            "https://generativelanguage.googleapis.com/v1beta/openai/"
        );
        assert_eq!(config.provider.model, "gemini-2.0-flash");
        assert_eq!(config.run.max_turns, 10);
        assert!(config.run.tracing_disabled);
        assert!(config.chat.streaming);
        assert!(config.chat.track_history);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_missing_or_blank_key() {
        let settings = ProviderSettings::default();
        let err = settings.api_key(env(&[])).unwrap_err();
        assert!(matches!(err, AgentsError::MissingApiKey { ref var } if var == "GEMINI_API_KEY"));

        let err = settings.api_key(env(&[("GEMINI_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, AgentsError::MissingApiKey { .. }));

        assert_eq!(
            settings.api_key(env(&[("GEMINI_API_KEY", "abc")])).unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_inline_key_wins_and_is_redacted() {
        let settings = ProviderSettings {
            api_key: Some("secret-inline".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.api_key(env(&[("GEMINI_API_KEY", "from-env")])).unwrap(),
            "secret-inline"
        );
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("secret-inline"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("PANACLOUD_MODEL", "gemini-1.5-pro"),
                ("PANACLOUD_MAX_TURNS", "4"),
                ("PANACLOUD_BIND", "0.0.0.0:9000"),
                ("PANACLOUD_STREAMING", "false"),
                ("PANACLOUD_TRACING", "1"),
            ]))
            .unwrap();

        assert_eq!(config.provider.model, "gemini-1.5-pro");
        assert_eq!(config.run.max_turns, 4);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(!config.chat.streaming);
        assert!(!config.run.tracing_disabled);
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("PANACLOUD_MAX_TURNS", "many")])),
            Err(AgentsError::ConfigError(_))
        ));
        assert!(matches!(
            config.apply_overrides(env(&[("PANACLOUD_MAX_TURNS", "0")])),
            Err(AgentsError::ConfigError(_))
        ));
        assert!(matches!(
            config.apply_overrides(env(&[("PANACLOUD_STREAMING", "maybe")])),
            Err(AgentsError::ConfigError(_))
        ));
    }

    #[test]
    fn test_from_toml_fills_missing_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [provider]
            model = "gemini-2.5-flash"

            [chat]
            streaming = false
            "#,
        )
        .unwrap();
        assert_eq!(config.provider.model, "gemini-2.5-flash");
        assert_eq!(config.provider.api_key_env, "GEMINI_API_KEY");
        assert!(!config.chat.streaming);
        assert!(config.chat.track_history);
        assert_eq!(config.run.max_turns, 10);
    }

    #[test]
    fn test_model_handle_and_run_config() {
        let config = AppConfig::default();
        assert!(config.model_handle_with(env(&[])).is_err());

        let model = config
            .model_handle_with(env(&[("GEMINI_API_KEY", "k")]))
            .unwrap();
        assert_eq!(model.model_name(), "gemini-2.0-flash");

        let run = config.run_config(model);
        assert_eq!(run.max_turns, 10);
        assert!(run.tracing_disabled);
        let bound = run.model.map(|m| m.model_name().to_string());
        assert_eq!(bound.as_deref(), Some("gemini-2.0-flash"));
    }
}
