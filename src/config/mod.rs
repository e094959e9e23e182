//! Agent configuration (layered: code > env > TOML file > defaults).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::agent_loop::QueueMode;
use crate::error::HelmError;
use crate::types::{GenerationOptions, ThinkingBudgets, ThinkingLevel, DEFAULT_MAX_RETRY_DELAY_MS};

/// Model identifier used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "default";

const ENV_MODEL: &str = "HELM_MODEL";
const ENV_SYSTEM_PROMPT: &str = "HELM_SYSTEM_PROMPT";
const ENV_THINKING_LEVEL: &str = "HELM_THINKING_LEVEL";
const ENV_TEMPERATURE: &str = "HELM_TEMPERATURE";
const ENV_MAX_TOKENS: &str = "HELM_MAX_TOKENS";
const ENV_MAX_RETRY_DELAY_MS: &str = "HELM_MAX_RETRY_DELAY_MS";
const ENV_SESSION_ID: &str = "HELM_SESSION_ID";
const ENV_STEERING_MODE: &str = "HELM_STEERING_MODE";
const ENV_FOLLOW_UP_MODE: &str = "HELM_FOLLOW_UP_MODE";

/// Loop configuration for an [`Agent`](crate::agent::Agent).
///
/// Build it in code with [`AgentConfig::builder`], or resolve it with
/// [`AgentConfig::from_env`] / [`AgentConfig::load`]. Values set in code after
/// loading win over everything else.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub thinking_level: ThinkingLevel,
    pub thinking_budgets: Option<ThinkingBudgets>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Cap for server-requested retry delays; `0` disables the cap.
    #[builder(default = DEFAULT_MAX_RETRY_DELAY_MS)]
    pub max_retry_delay_ms: u64,
    /// Forwarded to the provider for prompt caching.
    #[builder(into)]
    pub session_id: Option<String>,
    #[builder(default)]
    pub steering_mode: QueueMode,
    #[builder(default)]
    pub follow_up_mode: QueueMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AgentConfig {
    /// Defaults overlaid with `HELM_*` environment variables (`.env` honored).
    pub fn from_env() -> Result<Self, HelmError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides()
    }

    /// Parse a TOML document onto the defaults. Environment is not consulted.
    pub fn from_toml_str(raw: &str) -> Result<Self, HelmError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HelmError> {
        let _ = dotenvy::dotenv();
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)?.with_env_overrides()
    }

    /// Load [`default_config_path`] when it exists, otherwise [`from_env`](Self::from_env).
    pub fn load_default() -> Result<Self, HelmError> {
        let path = default_config_path();
        if path.is_file() {
            Self::load(path)
        } else {
            Self::from_env()
        }
    }

    /// Apply any `HELM_*` variables present in the process environment.
    pub fn with_env_overrides(mut self) -> Result<Self, HelmError> {
        if let Some(model) = env_string(ENV_MODEL) {
            self.model = model;
        }
        if let Some(prompt) = env_string(ENV_SYSTEM_PROMPT) {
            self.system_prompt = Some(prompt);
        }
        if let Some(level) = env_parse::<ThinkingLevel>(ENV_THINKING_LEVEL)? {
            self.thinking_level = level;
        }
        if let Some(temperature) = env_parse::<f64>(ENV_TEMPERATURE)? {
            self.temperature = Some(temperature);
        }
        if let Some(max_tokens) = env_parse::<u32>(ENV_MAX_TOKENS)? {
            self.max_tokens = Some(max_tokens);
        }
        if let Some(delay) = env_parse::<u64>(ENV_MAX_RETRY_DELAY_MS)? {
            self.max_retry_delay_ms = delay;
        }
        if let Some(session_id) = env_string(ENV_SESSION_ID) {
            self.session_id = Some(session_id);
        }
        if let Some(mode) = env_parse::<QueueMode>(ENV_STEERING_MODE)? {
            self.steering_mode = mode;
        }
        if let Some(mode) = env_parse::<QueueMode>(ENV_FOLLOW_UP_MODE)? {
            self.follow_up_mode = mode;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values no provider accepts.
    pub fn validate(&self) -> Result<(), HelmError> {
        if self.model.trim().is_empty() {
            return Err(HelmError::Configuration("model must not be empty".into()));
        }
        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() || temperature < 0.0 {
                return Err(HelmError::Configuration(format!(
                    "temperature must be a non-negative number, got {temperature}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(HelmError::Configuration(
                "max_tokens must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Options sent with every generation call.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::builder()
            .maybe_temperature(self.temperature)
            .maybe_max_tokens(self.max_tokens)
            .maybe_reasoning(
                (self.thinking_level != ThinkingLevel::Off).then_some(self.thinking_level),
            )
            .maybe_thinking_budgets(self.thinking_budgets)
            .max_retry_delay_ms(self.max_retry_delay_ms)
            .build()
    }
}

/// `~/.helm/config.toml`, or `.helm/config.toml` when no home directory exists.
pub fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".helm"))
        .unwrap_or_else(|| PathBuf::from(".helm"))
        .join("config.toml")
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, HelmError> {
    let Some(raw) = env_string(name) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| HelmError::Configuration(format!("invalid value for {name}: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_builder_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.thinking_level, ThinkingLevel::Off);
        assert_eq!(config.max_retry_delay_ms, DEFAULT_MAX_RETRY_DELAY_MS);
        assert_eq!(config.steering_mode, QueueMode::OneAtATime);
        assert_eq!(config.follow_up_mode, QueueMode::OneAtATime);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = AgentConfig::from_toml_str(
            r#"
            model = "stub-model"
            thinking_level = "medium"
            steering_mode = "all"
            max_tokens = 512
            "#,
        )
        .expect("parse config");

        assert_eq!(config.model, "stub-model");
        assert_eq!(config.thinking_level, ThinkingLevel::Medium);
        assert_eq!(config.steering_mode, QueueMode::All);
        assert_eq!(config.follow_up_mode, QueueMode::OneAtATime);
        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.system_prompt, None);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = AgentConfig::from_toml_str("modle = \"typo\"").unwrap_err();
        assert!(matches!(err, HelmError::TomlParse(_)));
    }

    #[test]
    fn validation_rejects_zero_max_tokens() {
        let err = AgentConfig::from_toml_str("max_tokens = 0").unwrap_err();
        assert!(matches!(err, HelmError::Configuration(_)));
    }

    #[test]
    fn generation_options_omit_reasoning_when_off() {
        let options = AgentConfig::builder()
            .temperature(0.2)
            .max_retry_delay_ms(0)
            .build()
            .generation_options();
        assert_eq!(options.reasoning, None);
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_retry_delay_ms, 0);

        let options = AgentConfig::builder()
            .thinking_level(ThinkingLevel::High)
            .build()
            .generation_options();
        assert_eq!(options.reasoning, Some(ThinkingLevel::High));
        assert_eq!(options.thinking_budget(), Some(16384));
    }

    #[test]
    fn default_path_ends_with_helm_config() {
        let path = default_config_path();
        assert!(path.ends_with(".helm/config.toml"));
    }
}
