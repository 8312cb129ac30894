//! Per-client fixed-window rate governor.
//!
//! Every identity gets `ceiling` admissions per window. The first request of
//! an identity, or the first one after its window has elapsed, opens a new
//! window with a count of one. This is a coarse fixed window, not a sliding
//! log: a client can spend a full budget at the end of one window and another
//! at the start of the next.
//!
//! Register and claim share one budget. The governor knows nothing about the
//! store; rejected callers must not touch it.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Limits applied by the governor. Swappable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorSettings {
    pub enabled: bool,
    /// Admissions per identity per window.
    pub ceiling: u32,
    pub window: Duration,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for GovernorSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ceiling: config.requests_per_window,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Over budget until the current window closes.
    Limited { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    window_start: u64,
}

/// Fixed-window admission control keyed by client identity.
pub struct RateGovernor {
    clients: DashMap<String, ClientWindow>,
    settings: ArcSwap<GovernorSettings>,
    clock: Arc<dyn Clock>,
}

impl RateGovernor {
    pub fn new(settings: GovernorSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: DashMap::new(),
            settings: ArcSwap::from_pointee(settings),
            clock,
        }
    }

    /// Admit or reject one request from `identity` at the current time.
    pub fn admit(&self, identity: &str) -> bool {
        self.check(identity).is_allowed()
    }

    /// Like [`admit`](Self::admit), reporting how long a rejected client should wait.
    pub fn check(&self, identity: &str) -> Admission {
        self.check_at(identity, self.clock.now_millis())
    }

    /// Admission decision for `identity` at `now` (unix milliseconds).
    pub fn check_at(&self, identity: &str, now: u64) -> Admission {
        let settings = self.settings.load();
        if !settings.enabled {
            return Admission::Allowed;
        }
        let window = settings.window.as_millis() as u64;

        // The entry guard holds the shard lock, so the read-modify-write below
        // is indivisible per identity.
        let mut client = self
            .clients
            .entry(identity.to_owned())
            .or_insert(ClientWindow {
                count: 0,
                window_start: now,
            });

        let elapsed = now.saturating_sub(client.window_start);
        if client.count == 0 || elapsed >= window {
            client.count = 1;
            client.window_start = now;
            return Admission::Allowed;
        }

        client.count = client.count.saturating_add(1);
        if client.count <= settings.ceiling {
            Admission::Allowed
        } else {
            Admission::Limited {
                retry_after: Duration::from_millis(window - elapsed),
            }
        }
    }

    /// `admit` with an explicit timestamp.
    pub fn admit_at(&self, identity: &str, now: u64) -> bool {
        self.check_at(identity, now).is_allowed()
    }

    /// Drop identities whose window has elapsed. Returns how many were removed.
    ///
    /// An elapsed window behaves exactly like an absent one, so eviction never
    /// changes a later admission decision.
    pub fn sweep_at(&self, now: u64) -> usize {
        let window = self.settings.load().window.as_millis() as u64;
        let before = self.clients.len();
        self.clients
            .retain(|_, client| now.saturating_sub(client.window_start) < window);
        before.saturating_sub(self.clients.len())
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now_millis())
    }

    /// Number of identities currently holding a window.
    pub fn tracked_identities(&self) -> usize {
        self.clients.len()
    }

    pub fn settings(&self) -> GovernorSettings {
        **self.settings.load()
    }

    /// Replace the limits. Open windows keep their counts.
    pub fn update_settings(&self, settings: GovernorSettings) {
        let previous = self.settings.swap(Arc::new(settings));
        if *previous != settings {
            tracing::info!(
                enabled = settings.enabled,
                ceiling = settings.ceiling,
                window_secs = settings.window.as_secs(),
                "Rate limit settings updated"
            );
        }
    }
}

/// Periodically evict elapsed windows until shutdown.
pub async fn run_sweeper(
    governor: Arc<RateGovernor>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = governor.sweep();
                let tracked = governor.tracked_identities();
                if removed > 0 {
                    tracing::debug!(removed, tracked, "Swept expired rate windows");
                }
                metrics::record_tracked_identities(tracked);
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate window sweeper stopping");
                break;
            }
        }
    }
}
