//! Configuration loading, validation, and management for authorchat.
//!
//! Loads configuration from `~/.authorchat/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup; a bad configuration is fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.authorchat/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM backend settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Turn pipeline settings
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Webhook server settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Twilio WhatsApp credentials
    #[serde(default)]
    pub twilio: TwilioConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name ("gemini", "openai", "openrouter", "ollama", ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// How many recent messages go into a per-source prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_history_window() -> usize {
    5
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_window: default_history_window(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("history_window", &self.history_window)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound on per-source generations in flight for one turn
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,

    /// Per-source generation timeout
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Synthesis timeout
    #[serde(default = "default_aggregation_timeout_secs")]
    pub aggregation_timeout_secs: u64,

    /// Shortest acceptable synthesized reply (trimmed)
    #[serde(default = "default_min_reply_chars")]
    pub min_reply_chars: usize,

    /// Longest acceptable synthesized reply (trimmed)
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,

    /// Author used when the inbound recipient names no known author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_author: Option<String>,

    /// Sent to the user when a turn fails. Nothing is sent when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reply: Option<String>,
}

fn default_max_concurrent_sources() -> usize {
    5
}
fn default_response_timeout_secs() -> u64 {
    30
}
fn default_aggregation_timeout_secs() -> u64 {
    60
}
fn default_min_reply_chars() -> usize {
    10
}
fn default_max_reply_chars() -> usize {
    1000
}

impl ProcessingConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation_timeout_secs)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: default_max_concurrent_sources(),
            response_timeout_secs: default_response_timeout_secs(),
            aggregation_timeout_secs: default_aggregation_timeout_secs(),
            min_reply_chars: default_min_reply_chars(),
            max_reply_chars: default_max_reply_chars(),
            default_author: None,
            fallback_reply: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.authorchat/authorchat.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl StoreConfig {
    /// The database file to open.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("authorchat.db"))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Externally visible base URL Twilio posts to. When set together with
    /// `twilio.auth_token`, webhook signatures are verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            public_url: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// The WhatsApp sender number, without the `whatsapp:` prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Override the Twilio REST base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl TwilioConfig {
    /// Whether enough is set to send messages.
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.phone_number.is_some()
    }
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &redact(&self.auth_token))
            .field("phone_number", &self.phone_number)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "json".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `AUTHORCHAT_CONFIG`, or from
    /// the default location, then apply environment overrides.
    ///
    /// Environment variables take highest priority:
    /// - `AUTHORCHAT_API_KEY`, then `LLM_API_KEY`
    /// - `LLM_PROVIDER`, `LLM_MODEL`
    /// - `MAX_CONCURRENT_BOOKS`, `RESPONSE_TIMEOUT`, `AGGREGATION_TIMEOUT`
    /// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`
    /// - `LOG_LEVEL`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("AUTHORCHAT_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::config_dir().join("config.toml")),
        };

        let mut config = Self::read_file(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("AUTHORCHAT_API_KEY").or_else(|| lookup("LLM_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(raw) = lookup("MAX_CONCURRENT_BOOKS") {
            self.processing.max_concurrent_sources = parse_env("MAX_CONCURRENT_BOOKS", &raw)?;
        }
        if let Some(raw) = lookup("RESPONSE_TIMEOUT") {
            self.processing.response_timeout_secs = parse_env("RESPONSE_TIMEOUT", &raw)?;
        }
        if let Some(raw) = lookup("AGGREGATION_TIMEOUT") {
            self.processing.aggregation_timeout_secs = parse_env("AGGREGATION_TIMEOUT", &raw)?;
        }

        if let Some(sid) = lookup("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = Some(sid);
        }
        if let Some(token) = lookup("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = Some(token);
        }
        if let Some(number) = lookup("TWILIO_PHONE_NUMBER") {
            self.twilio.phone_number = Some(number);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".authorchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let p = &self.processing;
        if p.max_concurrent_sources == 0 {
            return Err(ConfigError::ValidationError(
                "processing.max_concurrent_sources must be at least 1".into(),
            ));
        }
        if p.response_timeout_secs == 0 || p.aggregation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "processing timeouts must be at least 1 second".into(),
            ));
        }
        if p.max_reply_chars <= p.min_reply_chars {
            return Err(ConfigError::ValidationError(
                "processing.max_reply_chars must exceed min_reply_chars".into(),
            ));
        }

        match self.store.backend.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown store backend '{other}' (expected sqlite or memory)"
                )));
            }
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown log format '{other}' (expected json or pretty)"
                )));
            }
        }

        Ok(())
    }

    /// Check if an LLM API key is available.
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a number, got '{raw}'")))
}

/// Get the user's home directory.
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

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.processing.max_concurrent_sources, 5);
        assert_eq!(config.processing.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.processing.aggregation_timeout(), Duration::from_secs(60));
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.llm.history_window, 5);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.provider, config.llm.provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.llm.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.processing.max_concurrent_sources = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reply_bounds_must_be_ordered() {
        let mut config = AppConfig::default();
        config.processing.max_reply_chars = config.processing.min_reply_chars;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "postgres".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.llm.provider, "gemini");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"

[processing]
response_timeout_secs = 2
default_author = "Slavoj Zizek"

[gateway]
public_url = "https://chat.example.org"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.processing.response_timeout_secs, 2);
        assert_eq!(config.processing.max_concurrent_sources, 5);
        assert_eq!(config.processing.default_author.as_deref(), Some("Slavoj Zizek"));
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.gateway.public_url.as_deref(), Some("https://chat.example.org"));
        assert_eq!(config.gateway.port, 8000);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm\nprovider = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[
                ("LLM_API_KEY", "secret"),
                ("LLM_MODEL", "gemini-2.0-flash"),
                ("MAX_CONCURRENT_BOOKS", "3"),
                ("RESPONSE_TIMEOUT", "12"),
                ("TWILIO_PHONE_NUMBER", "+14155238886"),
                ("LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.processing.max_concurrent_sources, 3);
        assert_eq!(config.processing.response_timeout_secs, 12);
        assert_eq!(config.twilio.phone_number.as_deref(), Some("+14155238886"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn authorchat_api_key_wins() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[("AUTHORCHAT_API_KEY", "a"), ("LLM_API_KEY", "b")]))
            .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("a"));
    }

    #[test]
    fn non_numeric_env_is_validation_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(env(&[("RESPONSE_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-live-123".into());
        config.twilio.auth_token = Some("tw-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(!debug.contains("tw-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini"));
        assert!(toml_str.contains("8000"));
    }
}
