use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::exchange::StatsSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub tracked_identities: usize,
}

#[derive(Serialize)]
pub struct ExchangeStats {
    pub exchange: StatsSnapshot,
    pub rate_limit: RateLimitStatus,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<ExchangeStats> {
    let governor = state.service.governor();
    let settings = governor.settings();

    Json(ExchangeStats {
        exchange: state.service.stats(),
        rate_limit: RateLimitStatus {
            enabled: settings.enabled,
            requests_per_window: settings.ceiling,
            window_secs: settings.window.as_secs(),
            tracked_identities: governor.tracked_identities(),
        },
    })
}
