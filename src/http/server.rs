//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the exchange service (governor, store, engine) from config
//! - Create the Axum router with handlers and middleware
//! - Run the rate window and expired entry sweepers, apply live rate limit updates
//! - Serve until the shutdown signal, then drain gracefully

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::config::ExchangeConfig;
use crate::exchange::{run_expiry_sweeper, ExchangeService};
use crate::http::admission::admission_middleware;
use crate::http::cors::cors_layer;
use crate::http::handlers::{claim_phrase, health, register_phrase};
use crate::http::request::{request_span, UuidRequestId, X_REQUEST_ID};
use crate::security::rate_limit::{run_sweeper, GovernorSettings, RateGovernor};
use crate::storage::{KvEngine, MemoryEngine, RendezvousStore, StoreSettings};

/// The exchange service as shared by handlers.
pub type SharedService = Arc<ExchangeService<Arc<dyn KvEngine>>>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: SharedService,
    pub trust_forwarded: bool,
    /// Budget for one exchange call; past it the store commits nothing.
    pub request_timeout: Duration,
}

/// HTTP server for the phrase exchange.
pub struct HttpServer {
    router: Router,
    config: ExchangeConfig,
    service: SharedService,
}

impl HttpServer {
    /// Server backed by a fresh in-memory engine and the system clock.
    pub fn new(config: ExchangeConfig) -> Self {
        Self::with_parts(config, Arc::new(MemoryEngine::new()), Arc::new(SystemClock))
    }

    /// Server over a caller-provided engine and clock.
    pub fn with_parts(
        config: ExchangeConfig,
        engine: Arc<dyn KvEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let governor = Arc::new(RateGovernor::new(
            GovernorSettings::from(&config.rate_limit),
            clock.clone(),
        ));
        let store = RendezvousStore::new(engine, StoreSettings::from(&config.storage), clock);
        let service: SharedService = Arc::new(ExchangeService::new(
            governor,
            store,
            config.exchange.max_maddr_len,
        ));

        let state = AppState {
            service: service.clone(),
            trust_forwarded: config.security.trust_forwarded_headers,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };
        let router = Self::build_router(&config, state);

        Self {
            router,
            config,
            service,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The exchange routes are metered by the admission middleware before any
    /// extractor runs. They are kept out of `TimeoutLayer`: dropping a response
    /// after the store committed would lose a claimed payload, so they bound
    /// their work with a store deadline instead.
    #[allow(deprecated)]
    fn build_router(config: &ExchangeConfig, state: AppState) -> Router {
        let exchange = Router::new()
            .route("/phrase", post(register_phrase))
            .route("/phrase/{phrase}", get(claim_phrase))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                admission_middleware,
            ));

        let probes = Router::new()
            .route("/health", get(health))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )));

        let mut router = exchange
            .merge(probes)
            .layer(DefaultBodyLimit::max(config.security.max_body_size))
            .with_state(state);

        if let Some(cors) = cors_layer(&config.cors) {
            router = router.layer(cors);
        }

        let layers = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID));
        router.layer(layers)
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the rate governor's
    /// limits; other sections need a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ExchangeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let governor = self.service.governor().clone();
        let sweep_interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1));
        tokio::spawn(run_sweeper(
            governor.clone(),
            sweep_interval,
            shutdown.resubscribe(),
        ));
        tokio::spawn(run_expiry_sweeper(
            self.service.clone(),
            Duration::from_secs(self.config.storage.sweep_interval_secs.max(1)),
            shutdown.resubscribe(),
        ));

        let mut updates_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => governor.update_settings(GovernorSettings::from(&config.rate_limit)),
                        None => break,
                    },
                    _ = updates_shutdown.recv() => break,
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The router, for serving in-process (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn service(&self) -> SharedService {
        self.service.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    use crate::storage::EngineError;

    fn app(config: ExchangeConfig) -> (Router, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let server = HttpServer::with_parts(config, Arc::new(MemoryEngine::new()), clock.clone());
        (with_peer(server.router()), clock)
    }

    fn with_peer(router: Router) -> Router {
        let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();
        router.layer(MockConnectInfo(peer))
    }

    /// Engine whose reads stall while `slow` is set.
    #[derive(Default)]
    struct SlowEngine {
        inner: MemoryEngine,
        slow: AtomicBool,
    }

    impl SlowEngine {
        fn stall(&self) {
            if self.slow.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1_200));
            }
        }
    }

    impl KvEngine for SlowEngine {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
            self.stall();
            self.inner.get(key)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
            self.inner.put(key, value)
        }

        fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
            self.inner.delete(key)
        }

        fn exists(&self, key: &[u8]) -> Result<bool, EngineError> {
            self.stall();
            self.inner.exists(key)
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, EngineError> {
            self.inner.scan_prefix(prefix)
        }
    }

    fn register_request(body: &str) -> Request<Body> {
        Request::post("/phrase")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn claim_request(phrase: &str) -> Request<Body> {
        Request::get(format!("/phrase/{phrase}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_claim() {
        let (app, _) = app(ExchangeConfig::default());

        let response = app
            .clone()
            .oneshot(register_request(r#"{"phrase":"5-cat-dog","maddr":"/ip4/1.2.3.4"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key(&X_REQUEST_ID));
        let body = json_body(response).await;
        assert_eq!(body["message"], "Address added successfully");
        assert_eq!(body["data"]["maddr"], "/ip4/1.2.3.4");

        let response = app.clone().oneshot(claim_request("5-cat-dog")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["phrase"], "5-cat-dog");
        assert_eq!(body["maddr"], "/ip4/1.2.3.4");

        let response = app.oneshot(claim_request("5-cat-dog")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["message"], "Phrase not found");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, _) = app(ExchangeConfig::default());
        let body = r#"{"phrase":"100-happy-snail","maddr":"a"}"#;

        let first = app.clone().oneshot(register_request(body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.clone().oneshot(register_request(body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["message"], "Phrase already exists");

        let bad_phrase = app
            .clone()
            .oneshot(register_request(r#"{"phrase":"05-cat-dog","maddr":"a"}"#))
            .await
            .unwrap();
        assert_eq!(bad_phrase.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(bad_phrase).await["message"], "Invalid phrase format");

        let bad_json = app.clone().oneshot(register_request("{oops")).await.unwrap();
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);

        let bad_claim = app.oneshot(claim_request("101-cat-dog")).await.unwrap();
        assert_eq!(bad_claim.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_over_http() {
        let mut config = ExchangeConfig::default();
        config.rate_limit.requests_per_window = 3;
        let (app, clock) = app(config);

        for _ in 0..3 {
            let response = app.clone().oneshot(claim_request("1-big-box")).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        // Malformed and over budget: the rate check wins.
        let response = app.clone().oneshot(claim_request("NOPE")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        // Health stays reachable.
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        clock.advance(Duration::from_secs(3600));
        let response = app.oneshot(claim_request("1-big-box")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mut config = ExchangeConfig::default();
        config.security.max_body_size = 2048;
        let (app, _) = app(config);

        let maddr = "x".repeat(4096);
        let body = format!(r#"{{"phrase":"5-cat-dog","maddr":"{maddr}"}}"#);
        let response = app.oneshot(register_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_preflight_for_allowed_origin() {
        let (app, _) = app(ExchangeConfig::default());
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/phrase")
            .header(header::ORIGIN, "https://fileferry.xyz")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://fileferry.xyz"
        );
    }

    #[tokio::test]
    async fn test_over_budget_wins_over_extractor_rejections() {
        let mut config = ExchangeConfig::default();
        config.rate_limit.requests_per_window = 1;
        config.security.max_body_size = 2048;
        let (app, _) = app(config);

        let response = app.clone().oneshot(claim_request("1-big-box")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Undecodable path segment.
        let response = app.clone().oneshot(claim_request("%FF")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let oversized = format!(r#"{{"phrase":"5-cat-dog","maddr":"{}"}}"#, "x".repeat(20_000));
        let response = app.clone().oneshot(register_request(&oversized)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.oneshot(register_request("{oops")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_extractor_rejections_are_charged() {
        let mut config = ExchangeConfig::default();
        config.rate_limit.requests_per_window = 2;
        config.security.max_body_size = 2048;
        let (app, _) = app(config);

        let response = app.clone().oneshot(claim_request("%FF")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let oversized = format!(r#"{{"phrase":"5-cat-dog","maddr":"{}"}}"#, "x".repeat(4096));
        let response = app.clone().oneshot(register_request(&oversized)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = app.oneshot(claim_request("1-big-box")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_slow_store_commits_nothing_past_deadline() {
        let mut config = ExchangeConfig::default();
        config.timeouts.request_secs = 1;
        let engine = Arc::new(SlowEngine::default());
        let server = HttpServer::with_parts(
            config,
            engine.clone(),
            Arc::new(ManualClock::new(1_000_000)),
        );
        let app = with_peer(server.router());
        let body = r#"{"phrase":"5-cat-dog","maddr":"/ip4/1.2.3.4"}"#;

        engine.slow.store(true, Ordering::SeqCst);
        let response = app.clone().oneshot(register_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(engine.inner.is_empty());

        engine.slow.store(false, Ordering::SeqCst);
        let response = app.clone().oneshot(register_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        engine.slow.store(true, Ordering::SeqCst);
        let response = app.clone().oneshot(claim_request("5-cat-dog")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(engine.inner.len(), 1);

        engine.slow.store(false, Ordering::SeqCst);
        let response = app.oneshot(claim_request("5-cat-dog")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["maddr"], "/ip4/1.2.3.4");
        assert!(engine.inner.is_empty());
    }
}
