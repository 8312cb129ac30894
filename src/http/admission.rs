//! Rate admission for the exchange routes.
//!
//! Runs as route middleware, ahead of every extractor, so a client over
//! budget gets 429 whatever the path or body looks like, and every request
//! that reaches a route is charged.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::exchange::Operation;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::client_identity;

/// Identity the request was charged to, for the handler.
#[derive(Debug, Clone)]
pub struct ClientIdentity(pub String);

pub async fn admission_middleware(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let operation = if request.method() == Method::POST {
        Operation::Register
    } else {
        Operation::Claim
    };
    let identity = client_identity(request.headers(), peer, state.trust_forwarded);

    match state.service.admit(operation, &identity) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIdentity(identity));
            next.run(request).await
        }
        Err(err) => {
            let response = err.into_response();
            metrics::record_request(operation.as_str(), response.status().as_u16(), start);
            response
        }
    }
}
