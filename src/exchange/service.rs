//! Register/claim orchestration.
//!
//! Each call runs the same gate sequence: rate governor, then passphrase
//! (and payload) validation, then the store. A request over budget is
//! rejected before anything else is looked at, so malformed traffic costs a
//! client exactly as much budget as well-formed traffic and never reaches the
//! store.
//!
//! Transports that must meter a request before decoding it call
//! [`ExchangeService::admit`] themselves and then the `complete_*` methods.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::exchange::types::{AddressItem, ExchangeError};
use crate::observability::metrics;
use crate::passphrase::Passphrase;
use crate::security::rate_limit::{Admission, RateGovernor};
use crate::storage::{KvEngine, RendezvousStore};

/// Which exchange operation a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    Claim,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Claim => "claim",
        }
    }
}

/// Outcome counters since start.
#[derive(Debug, Default)]
pub struct ServiceStats {
    registered: AtomicU64,
    claimed: AtomicU64,
    conflicts: AtomicU64,
    not_found: AtomicU64,
    invalid: AtomicU64,
    rate_limited: AtomicU64,
    store_failures: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub claimed: u64,
    pub conflicts: u64,
    pub not_found: u64,
    pub invalid: u64,
    pub rate_limited: u64,
    pub store_failures: u64,
}

impl ServiceStats {
    fn record_error(&self, err: &ExchangeError) {
        let counter = match err {
            ExchangeError::RateLimited { .. } => &self.rate_limited,
            ExchangeError::InvalidFormat(_) => &self.invalid,
            ExchangeError::Conflict => &self.conflicts,
            ExchangeError::NotFound => &self.not_found,
            ExchangeError::StoreUnavailable(_) => &self.store_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// The two exchange operations, transport agnostic.
pub struct ExchangeService<E> {
    governor: Arc<RateGovernor>,
    store: RendezvousStore<E>,
    max_maddr_len: usize,
    stats: ServiceStats,
}

impl<E: KvEngine> ExchangeService<E> {
    pub fn new(governor: Arc<RateGovernor>, store: RendezvousStore<E>, max_maddr_len: usize) -> Self {
        Self {
            governor,
            store,
            max_maddr_len,
            stats: ServiceStats::default(),
        }
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn store(&self) -> &RendezvousStore<E> {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Register `item.maddr` under `item.phrase` on behalf of `identity`.
    pub fn handle_register(
        &self,
        identity: &str,
        item: AddressItem,
    ) -> Result<AddressItem, ExchangeError> {
        self.admit(Operation::Register, identity)?;
        let result = self.register(item, None);
        self.finish(Operation::Register, identity, result)
    }

    /// Register from a raw JSON body. Decoding happens after the rate check.
    pub fn handle_register_json(
        &self,
        identity: &str,
        body: &[u8],
    ) -> Result<AddressItem, ExchangeError> {
        self.admit(Operation::Register, identity)?;
        self.complete_register_json(identity, body, None)
    }

    /// Claim the item registered under `phrase`, consuming it.
    pub fn handle_claim(&self, identity: &str, phrase: &str) -> Result<AddressItem, ExchangeError> {
        self.admit(Operation::Claim, identity)?;
        self.complete_claim(identity, phrase, None)
    }

    /// Charge one request to `identity`. A rejection is recorded as the
    /// outcome of `operation`.
    pub fn admit(&self, operation: Operation, identity: &str) -> Result<(), ExchangeError> {
        match self.governor.check(identity) {
            Admission::Allowed => Ok(()),
            Admission::Limited { retry_after } => self.finish(
                operation,
                identity,
                Err(ExchangeError::RateLimited { retry_after }),
            ),
        }
    }

    /// Register from a JSON body for a caller that already passed [`admit`](Self::admit).
    /// Past `deadline` the store writes nothing.
    pub fn complete_register_json(
        &self,
        identity: &str,
        body: &[u8],
        deadline: Option<Instant>,
    ) -> Result<AddressItem, ExchangeError> {
        let result = serde_json::from_slice::<AddressItem>(body)
            .map_err(|e| ExchangeError::InvalidFormat(format!("Invalid JSON payload: {e}")))
            .and_then(|item| self.register(item, deadline));
        self.finish(Operation::Register, identity, result)
    }

    /// Claim for a caller that already passed [`admit`](Self::admit).
    /// Past `deadline` the entry is left in place.
    pub fn complete_claim(
        &self,
        identity: &str,
        phrase: &str,
        deadline: Option<Instant>,
    ) -> Result<AddressItem, ExchangeError> {
        let result = Passphrase::parse(phrase)
            .map_err(|_| ExchangeError::invalid_phrase())
            .and_then(|phrase| {
                self.store
                    .claim_within::<AddressItem>(&phrase, deadline)
                    .map_err(ExchangeError::from)
            });
        self.finish(Operation::Claim, identity, result)
    }

    fn register(
        &self,
        item: AddressItem,
        deadline: Option<Instant>,
    ) -> Result<AddressItem, ExchangeError> {
        let phrase = Passphrase::parse(item.phrase.as_str())
            .map_err(|_| ExchangeError::invalid_phrase())?;
        self.validate_maddr(&item.maddr)?;
        self.store.register_within(&phrase, &item, deadline)?;
        Ok(item)
    }

    fn validate_maddr(&self, maddr: &str) -> Result<(), ExchangeError> {
        if maddr.trim().is_empty() {
            return Err(ExchangeError::InvalidFormat(
                "maddr must not be empty".to_string(),
            ));
        }
        if maddr.len() > self.max_maddr_len {
            return Err(ExchangeError::InvalidFormat(format!(
                "maddr exceeds {} bytes",
                self.max_maddr_len
            )));
        }
        Ok(())
    }

    fn finish<T>(
        &self,
        operation: Operation,
        identity: &str,
        result: Result<T, ExchangeError>,
    ) -> Result<T, ExchangeError> {
        let op = operation.as_str();
        match &result {
            Ok(_) => {
                let counter = match operation {
                    Operation::Register => &self.stats.registered,
                    Operation::Claim => &self.stats.claimed,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                metrics::record_outcome(op, "ok");
                tracing::debug!(client = %identity, operation = op, "Exchange succeeded");
            }
            Err(err) => {
                self.stats.record_error(err);
                metrics::record_outcome(op, err.label());
                match err {
                    ExchangeError::RateLimited { .. } => {
                        metrics::record_rate_limited();
                        tracing::warn!(client = %identity, operation = op, "Rate limit exceeded");
                    }
                    ExchangeError::StoreUnavailable(e) => {
                        tracing::error!(client = %identity, operation = op, error = %e, "Store failure");
                    }
                    _ => {
                        tracing::debug!(
                            client = %identity,
                            operation = op,
                            outcome = err.label(),
                            "Exchange rejected"
                        );
                    }
                }
            }
        }
        result
    }
}

/// Periodically delete expired entries until shutdown.
pub async fn run_expiry_sweeper<E: KvEngine + 'static>(
    service: Arc<ExchangeService<E>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let service = service.clone();
                match tokio::task::spawn_blocking(move || service.store().sweep_expired()).await {
                    Ok(Ok(removed)) => {
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired entries");
                        }
                        metrics::record_expired_entries(removed);
                    }
                    Ok(Err(e)) => tracing::warn!(error = %e, "Expiry sweep failed"),
                    Err(e) => tracing::error!(error = %e, "Expiry sweep task failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("Expiry sweeper stopping");
                break;
            }
        }
    }
}
