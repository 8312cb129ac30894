//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, SERVER_HOST/SERVER_PORT overrides)
//!     → validation.rs (semantic checks)
//!     → ExchangeConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → update sent to the running server
//!     → rate governor settings swapped in place
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only rate limit settings are applied live; the rest needs a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{
    load_config, load_config_with, load_or_default, parse_config, parse_config_with, ConfigError,
    ListenerOverrides,
};
pub use schema::{
    AdminConfig, CorsConfig, ExchangeConfig, ListenerConfig, ObservabilityConfig, PayloadConfig,
    RateLimitConfig, SecurityConfig, StorageConfig, TimeoutConfig,
};
pub use watcher::ConfigWatcher;
