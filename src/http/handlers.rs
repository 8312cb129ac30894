//! Exchange endpoints.
//!
//! - `POST /phrase` registers `{"phrase", "maddr"}`
//! - `GET /phrase/{phrase}` claims and consumes the entry
//! - `GET /health` liveness, outside the rate budget
//!
//! Both exchange routes sit behind the admission middleware, which has
//! already charged the request. Store access is synchronous, so service
//! calls run on the blocking pool with a deadline of `timeouts.request_secs`.
//! Once the store commits, the result is always returned.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;

use crate::exchange::{AddressItem, ExchangeError};
use crate::http::admission::ClientIdentity;
use crate::http::response::{message, RegisteredBody};
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn register_phrase(
    State(state): State<AppState>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let deadline = start + state.request_timeout;
    let service = state.service.clone();

    let result = tokio::task::spawn_blocking(move || {
        service.complete_register_json(&identity, &body, Some(deadline))
    })
    .await;

    let response = match result {
        Ok(Ok(item)) => (StatusCode::CREATED, Json(RegisteredBody::new(item))).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(e) => task_failed(e),
    };
    metrics::record_request("register", response.status().as_u16(), start);
    response
}

pub async fn claim_phrase(
    State(state): State<AppState>,
    Extension(ClientIdentity(identity)): Extension<ClientIdentity>,
    Path(phrase): Path<String>,
) -> Response {
    let start = Instant::now();
    let deadline = start + state.request_timeout;
    let service = state.service.clone();

    let result: Result<Result<AddressItem, ExchangeError>, _> =
        tokio::task::spawn_blocking(move || {
            service.complete_claim(&identity, &phrase, Some(deadline))
        })
        .await;

    let response = match result {
        Ok(Ok(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(e) => task_failed(e),
    };
    metrics::record_request("claim", response.status().as_u16(), start);
    response
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn task_failed(err: tokio::task::JoinError) -> Response {
    tracing::error!(error = %err, "Exchange task failed");
    message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process request")
}
