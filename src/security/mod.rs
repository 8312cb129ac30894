//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming exchange request:
//!     → identity.rs (derive client identity from the connection)
//!     → rate_limit.rs (fixed-window budget per identity)
//!     → passphrase validation and the store
//! ```
//!
//! # Design Decisions
//! - Rate limiting runs before any validation, so malformed traffic is
//!   throttled exactly like well-formed traffic
//! - Forwarding headers are ignored unless explicitly trusted

pub mod identity;
pub mod rate_limit;

pub use identity::client_identity;
pub use rate_limit::{Admission, GovernorSettings, RateGovernor};
