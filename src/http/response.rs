//! Response mapping.
//!
//! Bodies follow one shape: `{"message": ...}` for errors and for the
//! register acknowledgement, and the bare item for a successful claim.
//!
//! | error            | status |
//! |------------------|--------|
//! | InvalidFormat    | 400    |
//! | NotFound         | 404    |
//! | Conflict         | 409    |
//! | RateLimited      | 429 + `Retry-After` |
//! | StoreUnavailable | 500, or 503 when the request deadline passed first |

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::exchange::{AddressItem, ExchangeError};
use crate::storage::EngineError;

/// Plain message body.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

/// Body of a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisteredBody {
    pub message: &'static str,
    pub data: AddressItem,
}

impl RegisteredBody {
    pub fn new(data: AddressItem) -> Self {
        Self {
            message: "Address added successfully",
            data,
        }
    }
}

pub fn status_for(err: &ExchangeError) -> StatusCode {
    match err {
        ExchangeError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
        ExchangeError::NotFound => StatusCode::NOT_FOUND,
        ExchangeError::Conflict => StatusCode::CONFLICT,
        ExchangeError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        ExchangeError::StoreUnavailable(EngineError::DeadlineExceeded) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ExchangeError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error response with the given status.
pub fn message(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(MessageBody {
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        // Engine details stay in the logs.
        let text = match &self {
            ExchangeError::StoreUnavailable(EngineError::DeadlineExceeded) => {
                "Request timed out".to_string()
            }
            ExchangeError::StoreUnavailable(_) => "Failed to process request".to_string(),
            other => other.to_string(),
        };
        let mut response = message(status, text);

        if let ExchangeError::RateLimited { retry_after } = self {
            let secs = retry_after.as_millis().div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
