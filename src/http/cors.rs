//! CORS policy for browser clients.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// Build the CORS layer, or `None` when CORS is disabled.
///
/// Unparseable origins, methods or headers are skipped with a warning.
pub fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let mut cors = CorsLayer::new();

    if config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = parse_all(&config.allowed_origins, "origin");
        cors = cors.allow_origin(origins);
    }

    let methods: Vec<Method> = parse_all(&config.allowed_methods, "method");
    let headers: Vec<HeaderName> = parse_all(&config.allowed_headers, "header");
    let expose: Vec<HeaderName> = parse_all(&config.expose_headers, "expose header");

    Some(
        cors.allow_methods(methods)
            .allow_headers(headers)
            .expose_headers(expose)
            .max_age(Duration::from_secs(config.max_age_secs)),
    )
}

fn parse_all<T: std::str::FromStr>(values: &[String], what: &str) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(value = %value, kind = what, "Ignoring invalid CORS entry");
                None
            }
        })
        .collect()
}
