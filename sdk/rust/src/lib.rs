//! Client for the phrase exchange HTTP API.

pub mod client;

pub use client::{AddressItem, ClaimOutcome, ClientError, ExchangeClient, RegisterOutcome};
