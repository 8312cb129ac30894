//! Exchange subsystem.
//!
//! # Data Flow
//! ```text
//! register(identity, {phrase, maddr}) / claim(identity, phrase)
//!     → RateGovernor::check(identity)      RateLimited
//!     → passphrase grammar, payload limits InvalidFormat
//!     → RendezvousStore                    Conflict / NotFound / StoreUnavailable
//!     → AddressItem
//! ```

pub mod service;
pub mod types;

pub use service::{run_expiry_sweeper, ExchangeService, Operation, StatsSnapshot};
pub use types::{AddressItem, ExchangeError};
