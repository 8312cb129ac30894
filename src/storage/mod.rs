//! Storage subsystem.
//!
//! # Data Flow
//! ```text
//! ExchangeService
//!     → rendezvous.rs (striped lock, check-then-act, expiry)
//!     → engine.rs (KvEngine: get/put/delete/exists on opaque bytes)
//! ```

pub mod engine;
pub mod rendezvous;

pub use engine::{EngineError, KvEngine, MemoryEngine};
pub use rendezvous::{RendezvousStore, StoreError, StoreSettings};
