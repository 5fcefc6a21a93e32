//! Inbound message processing capability.
//!
//! A [`MessageProcessor`] is attached to a connection through
//! [`WebsocketOptions::with_processor`](crate::WebsocketOptions::with_processor)
//! and is called by the read pump for every inbound message, one at a time.
//! Returning an error closes the connection: the error text is sent to the
//! peer as `{"error": "..."}` before the teardown.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use wspool::{BoxError, MessageProcessor, Websocket};
//! use tokio_tungstenite::tungstenite::Bytes;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl MessageProcessor for Echo {
//!     async fn on_text_message(&self, websocket: &Websocket, message: Bytes) -> Result<(), BoxError> {
//!         websocket.write(message);
//!         Ok(())
//!     }
//!
//!     async fn on_binary_message(&self, _: &Websocket, _: Bytes) -> Result<(), BoxError> {
//!         Err("binary messages are not supported".into())
//!     }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::Bytes;

use crate::transport::Websocket;

// ============================================================================
// Types
// ============================================================================

/// Boxed error returned by processors.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

// ============================================================================
// MessageProcessor
// ============================================================================

/// Callbacks invoked by a connection's read pump.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Handles a text message.
    async fn on_text_message(&self, websocket: &Websocket, message: Bytes)
    -> Result<(), BoxError>;

    /// Handles a binary message.
    async fn on_binary_message(
        &self,
        websocket: &Websocket,
        message: Bytes,
    ) -> Result<(), BoxError>;

    /// Handles a protocol Ping frame.
    ///
    /// Only called when ping skipping is disabled.
    async fn on_ping_message(&self, _websocket: &Websocket, _payload: Bytes) -> Result<(), BoxError> {
        Ok(())
    }

    /// Handles a protocol Pong frame.
    ///
    /// Only called when pong skipping is disabled.
    async fn on_pong_message(&self, _websocket: &Websocket, _payload: Bytes) -> Result<(), BoxError> {
        Ok(())
    }
}
