//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;

use phrase_exchange::config::ExchangeConfig;
use phrase_exchange::http::HttpServer;
use phrase_exchange::lifecycle::Shutdown;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A running exchange on an ephemeral port.
pub struct TestExchange {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<ExchangeConfig>,
    pub handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestExchange {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start the exchange on 127.0.0.1:0. The listener is bound before this
/// returns, so requests can be sent immediately.
pub async fn spawn_exchange(config: ExchangeConfig) -> TestExchange {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();

    let handle = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    TestExchange {
        addr,
        shutdown,
        updates,
        handle,
    }
}
