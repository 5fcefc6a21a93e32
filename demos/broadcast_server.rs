//! Broadcast server demo.
//!
//! Accepts WebSocket clients into one pool, echoes their text messages back
//! and broadcasts a tick to everyone every few seconds.
//!
//! Usage:
//!   cargo run --example broadcast_server
//!   cargo run --example broadcast_server -- --debug
//!
//! Then connect with any WebSocket client, e.g.
//!   websocat ws://127.0.0.1:8080/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::Bytes;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wspool::{
    BoxError, ConnectionPool, ConnectionPoolMap, MessageProcessor, Websocket, WebsocketOptions,
    WebsocketServer,
};

// ============================================================================
// Processor
// ============================================================================

struct Echo;

#[async_trait]
impl MessageProcessor for Echo {
    async fn on_text_message(&self, websocket: &Websocket, message: Bytes) -> Result<(), BoxError> {
        websocket.write(message);
        Ok(())
    }

    async fn on_binary_message(&self, _: &Websocket, _: Bytes) -> Result<(), BoxError> {
        Err("binary messages are not supported".into())
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug = std::env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    let pools = ConnectionPoolMap::new();
    let pool = ConnectionPool::new();
    pools.set("lobby", pool.clone());

    let server = WebsocketServer::bind("127.0.0.1:8080").await?;
    info!(url = %server.ws_url(), "Listening");

    let ticker_pool = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let mut tick = 0u64;
        while !ticker_pool.is_closed() {
            interval.tick().await;
            tick += 1;
            ticker_pool.broadcast(format!(r#"{{"type":"tick","n":{tick}}}"#));
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = server.accept(options(&pools)) => {
                if let Err(e) = accepted {
                    warn!(error = %e, "Accept failed");
                }
            }
        }
    }

    info!(
        connections = pool.connection_count().await,
        "Shutting down"
    );
    pool.close().await;

    Ok(())
}

// ============================================================================
// Functions
// ============================================================================

fn options(pools: &ConnectionPoolMap) -> WebsocketOptions {
    let mut options = WebsocketOptions::new().with_processor(Arc::new(Echo));
    if let Some(pool) = pools.get("lobby") {
        options = options.with_connection_pool(pool);
    }
    options
}

fn init_logging(debug: bool) {
    let filter = if debug { "wspool=debug" } else { "wspool=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
