//! `authorchat config`: Configuration management commands.

use std::path::{Path, PathBuf};

use authorchat_config::AppConfig;

/// Where the config is read from: the flag, `AUTHORCHAT_CONFIG`, or the default.
pub fn resolve_path(path: Option<&Path>) -> PathBuf {
    match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var("AUTHORCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| AppConfig::config_dir().join("config.toml")),
    }
}

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut redacted = config.clone();
    if redacted.llm.api_key.is_some() {
        redacted.llm.api_key = Some("[REDACTED]".into());
    }
    if redacted.twilio.auth_token.is_some() {
        redacted.twilio.auth_token = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", resolve_path(path).display());
}

pub fn default() {
    println!("{}", AppConfig::default_toml());
}
