//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and addresses. All errors
//! are collected so an operator sees every problem in one pass.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ExchangeConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ExchangeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    let rate = &config.rate_limit;
    if rate.enabled {
        if rate.requests_per_window == 0 {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_window",
                "must be > 0 when rate limiting is enabled",
            ));
        }
        if rate.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be > 0"));
        }
        if rate.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be > 0",
            ));
        }
    }

    if config.storage.lock_stripes == 0 {
        errors.push(ValidationError::new("storage.lock_stripes", "must be > 0"));
    }
    if config.storage.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "storage.sweep_interval_secs",
            "must be > 0",
        ));
    }

    if config.exchange.max_maddr_len == 0 {
        errors.push(ValidationError::new("exchange.max_maddr_len", "must be > 0"));
    }

    if config.security.max_body_size < config.exchange.max_maddr_len {
        errors.push(ValidationError::new(
            "security.max_body_size",
            "must be at least exchange.max_maddr_len",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "not a socket address: {}",
                config.observability.metrics_address
            ),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("not a socket address: {}", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
