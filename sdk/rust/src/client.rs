use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressItem {
    pub phrase: String,
    pub maddr: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RegisteredBody {
    data: AddressItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(AddressItem),
    /// The phrase is already held by someone else.
    Taken,
    Invalid(String),
    RateLimited { retry_after: Option<Duration> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(AddressItem),
    /// Never registered, already claimed or expired.
    NotFound,
    Invalid(String),
    RateLimited { retry_after: Option<Duration> },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange returned {status}: {message}")]
    Server { status: StatusCode, message: String },
}

pub struct ExchangeClient {
    client: Client,
    base_url: String,
}

impl ExchangeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Register `maddr` under `phrase`.
    pub async fn register(&self, phrase: &str, maddr: &str) -> Result<RegisterOutcome, ClientError> {
        let resp = self
            .client
            .post(format!("{}/phrase", self.base_url))
            .json(&AddressItem {
                phrase: phrase.to_string(),
                maddr: maddr.to_string(),
            })
            .send()
            .await?;

        match resp.status() {
            StatusCode::CREATED => {
                let body: RegisteredBody = resp.json().await?;
                Ok(RegisterOutcome::Registered(body.data))
            }
            StatusCode::CONFLICT => Ok(RegisterOutcome::Taken),
            StatusCode::BAD_REQUEST => Ok(RegisterOutcome::Invalid(message(resp).await?)),
            StatusCode::TOO_MANY_REQUESTS => Ok(RegisterOutcome::RateLimited {
                retry_after: retry_after(&resp),
            }),
            status => Err(ClientError::Server {
                status,
                message: message(resp).await?,
            }),
        }
    }

    /// Claim the address under `phrase`. A successful claim consumes it.
    pub async fn claim(&self, phrase: &str) -> Result<ClaimOutcome, ClientError> {
        let resp = self
            .client
            .get(format!("{}/phrase/{}", self.base_url, phrase))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(ClaimOutcome::Claimed(resp.json().await?)),
            StatusCode::NOT_FOUND => Ok(ClaimOutcome::NotFound),
            StatusCode::BAD_REQUEST => Ok(ClaimOutcome::Invalid(message(resp).await?)),
            StatusCode::TOO_MANY_REQUESTS => Ok(ClaimOutcome::RateLimited {
                retry_after: retry_after(&resp),
            }),
            status => Err(ClientError::Server {
                status,
                message: message(resp).await?,
            }),
        }
    }

    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
        .map(Duration::from_secs)
}

async fn message(resp: Response) -> Result<String, ClientError> {
    let text = resp.text().await?;
    Ok(serde_json::from_str::<MessageBody>(&text)
        .map(|b| b.message)
        .unwrap_or(text))
}
