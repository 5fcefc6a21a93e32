//! WebSocket transport layer.
//!
//! This module owns everything that touches a socket: the per-connection
//! pumps, the broadcast pool and the upgrade helpers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   write()    ┌──────────────┐   frames    ┌──────────┐
//! │ Application  │─────────────►│  Websocket   │────────────►│  Peer    │
//! │ / PubSub     │              │  write pump  │             │          │
//! │              │  broadcast() │              │◄────────────│          │
//! │              │──┐           │  read pump   │   frames    └──────────┘
//! └──────────────┘  │           └──────┬───────┘
//!                   ▼                  │ on_text_message / on_binary_message
//!          ┌────────────────┐          ▼
//!          │ ConnectionPool │   MessageProcessor
//!          │  control loop  │
//!          └────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Websocket::new` - Wrap an upgraded socket, join the configured pool
//! 2. `Websocket::open` - Spawn the read and write pumps
//! 3. `Websocket::write` / `ConnectionPool::broadcast` - Queue outbound messages
//! 4. `Websocket::close` - Tear down once, leave the pool
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Socket provider traits and the tokio-tungstenite implementation |
//! | `connection` | Managed connection and its pumps |
//! | `pool` | Broadcast pool control loop |
//! | `pool_map` | Directory of named pools |
//! | `server` | Upgrade helpers |

// ============================================================================
// Submodules
// ============================================================================

/// Managed WebSocket connection and its pumps.
pub mod connection;

/// Broadcast connection pool.
pub mod pool;

/// Directory of named pools.
pub mod pool_map;

/// WebSocket upgrade helpers.
pub mod server;

/// Socket provider abstraction.
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionInfo, Websocket};
pub use pool::ConnectionPool;
pub use pool_map::ConnectionPoolMap;
pub use server::{WebsocketServer, accept_websocket};
pub use socket::{MessageReader, MessageWriter, Socket};
