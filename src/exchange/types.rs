//! Exchange payload and error types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{EngineError, StoreError};

/// The item swapped under a phrase: the phrase itself and the address behind it.
///
/// Capitalised keys (`Phrase`, `Maddr`) are accepted for clients written
/// against case-insensitive decoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressItem {
    #[serde(alias = "Phrase")]
    pub phrase: String,
    #[serde(alias = "Maddr")]
    pub maddr: String,
}

impl AddressItem {
    pub fn new(phrase: impl Into<String>, maddr: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            maddr: maddr.into(),
        }
    }
}

/// Every way a register or claim can be rejected. Exactly one per failure.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The identity spent its budget for the current window.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    /// Phrase grammar or payload validation failed.
    #[error("{0}")]
    InvalidFormat(String),

    #[error("Phrase already exists")]
    Conflict,

    /// Never registered, already claimed, or expired. Deliberately not distinguished.
    #[error("Phrase not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] EngineError),
}

impl ExchangeError {
    /// Stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ExchangeError::RateLimited { .. } => "rate_limited",
            ExchangeError::InvalidFormat(_) => "invalid_format",
            ExchangeError::Conflict => "conflict",
            ExchangeError::NotFound => "not_found",
            ExchangeError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn invalid_phrase() -> Self {
        ExchangeError::InvalidFormat("Invalid phrase format".to_string())
    }
}

impl From<StoreError> for ExchangeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => ExchangeError::Conflict,
            StoreError::NotFound => ExchangeError::NotFound,
            StoreError::Unavailable(e) => ExchangeError::StoreUnavailable(e),
        }
    }
}
