//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ExchangeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding the listener host.
pub const ENV_SERVER_HOST: &str = "SERVER_HOST";
/// Environment variable overriding the listener port.
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Listener address overrides taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
}

impl ListenerOverrides {
    /// Read `SERVER_HOST` / `SERVER_PORT`.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var(ENV_SERVER_HOST).ok(),
            port: std::env::var(ENV_SERVER_PORT).ok(),
        }
    }

    /// Apply on top of the listener address. Empty values are ignored.
    pub fn apply(&self, config: &mut ExchangeConfig) {
        let host = self.host.as_deref().filter(|h| !h.is_empty());
        let port = self.port.as_deref().filter(|p| !p.is_empty());
        if host.is_none() && port.is_none() {
            return;
        }

        let current = &config.listener.bind_address;
        let (current_host, current_port) = current
            .rsplit_once(':')
            .unwrap_or((current.as_str(), "8080"));

        config.listener.bind_address = format!(
            "{}:{}",
            host.unwrap_or(current_host),
            port.unwrap_or(current_port)
        );
    }
}

/// Load and validate configuration from a TOML file, honouring the environment.
pub fn load_config(path: &Path) -> Result<ExchangeConfig, ConfigError> {
    load_config_with(path, &ListenerOverrides::from_env())
}

pub fn load_config_with(
    path: &Path,
    overrides: &ListenerOverrides,
) -> Result<ExchangeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_with(&content, overrides)
}

/// Parse, apply environment overrides and validate configuration text.
pub fn parse_config(content: &str) -> Result<ExchangeConfig, ConfigError> {
    parse_config_with(content, &ListenerOverrides::from_env())
}

/// Parse, apply `overrides` and validate. Reads nothing from the process.
pub fn parse_config_with(
    content: &str,
    overrides: &ListenerOverrides,
) -> Result<ExchangeConfig, ConfigError> {
    let mut config: ExchangeConfig = toml::from_str(content)?;
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load configuration from `path` if given, otherwise start from defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ExchangeConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => parse_config(""),
    }
}
