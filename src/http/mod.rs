//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware: request id, trace, CORS)
//!     → admission.rs (client identity, rate budget, before any extractor)
//!     → handlers.rs (dispatch to ExchangeService with a store deadline)
//!     → response.rs (ExchangeError → status + JSON message)
//!     → Send to client
//! ```

pub mod admission;
pub mod cors;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, SharedService};
