//! wspool - Managed WebSocket connections with broadcast pools.
//!
//! This library keeps a changing set of live WebSocket connections healthy
//! and lets the application push messages to all of them at once, for
//! example to relay events from a message bus to connected clients.
//!
//! # Architecture
//!
//! - Each [`Websocket`] owns one socket and two tasks: a read pump that
//!   feeds a [`MessageProcessor`] and a write pump that drains an outbound
//!   queue and sends heartbeats.
//! - A [`ConnectionPool`] is a registry with a single control loop that
//!   fans broadcasts out to every member.
//! - A [`ConnectionPoolMap`] names pools, e.g. one per room or topic.
//! - The [`pubsub`] bridges forward an external publish/subscribe stream
//!   into a pool's broadcast.
//!
//! Dead peers are detected by the read deadline: any inbound message
//! renews it, a silent peer fails it and gets torn down.
//!
//! # Quick Start
//!
//! ```no_run
//! use wspool::{ConnectionPool, Result, WebsocketOptions, WebsocketServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pool = ConnectionPool::new();
//!     let server = WebsocketServer::bind("127.0.0.1:8080").await?;
//!
//!     let relay = pool.clone();
//!     tokio::spawn(async move {
//!         loop {
//!             tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!             relay.broadcast("tick");
//!         }
//!     });
//!
//!     loop {
//!         let options = WebsocketOptions::new().with_connection_pool(pool.clone());
//!         if let Err(e) = server.accept(options).await {
//!             tracing::warn!(error = %e, "Accept failed");
//!         }
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`options`] | Connection configuration |
//! | [`processor`] | Inbound message callbacks |
//! | [`pubsub`] | Publish/subscribe bridges |
//! | [`transport`] | Connections, pools and upgrade helpers |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Connection configuration.
pub mod options;

/// Inbound message processing capability.
pub mod processor;

/// Publish/subscribe bridges.
pub mod pubsub;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Configuration
pub use options::WebsocketOptions;

// Processing
pub use processor::{BoxError, MessageProcessor};

// Pub/sub
pub use pubsub::{PubSubHooks, PubSubMessage};

// Transport types
pub use transport::{
    ConnectionInfo, ConnectionPool, ConnectionPoolMap, Websocket, WebsocketServer,
    accept_websocket,
};
