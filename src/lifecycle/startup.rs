//! Startup orchestration.
//!
//! Order: metrics exporter, shutdown coordinator, config watcher, admin
//! listener, signal task, then the public listener last so traffic only
//! arrives once everything else is up. Any failure before serving is fatal.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::{ConfigWatcher, ExchangeConfig};
use crate::http::HttpServer;
use crate::lifecycle::signals::wait_for_signal;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Run the exchange until a termination signal arrives.
pub async fn run(config: ExchangeConfig, config_path: Option<&Path>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr = parse_addr("metrics", &config.observability.metrics_address)?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Arc::new(Shutdown::new());

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            tracing::info!(path = %path.display(), "Watching config for changes");
            (Some(handle), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let server = HttpServer::new(config.clone());

    if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        let router = setup_admin_router(AdminState {
            service: server.service(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = admin_shutdown.recv().await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let listener = bind(&config.listener.bind_address).await?;
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    // Stop background tasks if the server exited on its own.
    shutdown.trigger();
    Ok(())
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}
