//! Ephemeral passphrase rendezvous exchange.
//!
//! One peer registers an address under a short human-readable phrase such as
//! `42-happy-snail`; another peer claims it exactly once. Every request is
//! metered per client identity before anything else runs.
//!
//! ```text
//!     Client ──▶ http (identity, request id, timeout, CORS)
//!                  │
//!                  ▼
//!              exchange::ExchangeService
//!                  ├─▶ security::RateGovernor   fixed window per identity
//!                  ├─▶ passphrase               grammar check
//!                  └─▶ storage::RendezvousStore claim-once over a KvEngine
//! ```

// Core
pub mod clock;
pub mod exchange;
pub mod passphrase;
pub mod security;
pub mod storage;

// Surfaces
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ExchangeConfig;
pub use exchange::{AddressItem, ExchangeError, ExchangeService};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use passphrase::Passphrase;
