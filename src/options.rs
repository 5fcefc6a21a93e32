//! Connection configuration.
//!
//! Options are read once when a [`Websocket`](crate::Websocket) is
//! constructed and never re-applied.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wspool::{ConnectionPool, WebsocketOptions};
//!
//! let pool = ConnectionPool::new();
//! let options = WebsocketOptions::new()
//!     .with_connection_pool(pool.clone())
//!     .with_read_deadline(Duration::from_secs(30))
//!     .with_ping_message_period(Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use crate::processor::MessageProcessor;
use crate::transport::ConnectionPool;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum inbound message size (4 MiB).
pub const DEFAULT_READ_LIMIT: usize = 4 * 1024 * 1024;

/// Default read deadline.
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(60);

/// Default write deadline.
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(60);

/// Default heartbeat period.
pub const DEFAULT_PING_MESSAGE_PERIOD: Duration = Duration::from_secs(20);

/// Default heartbeat ping payload.
pub const DEFAULT_PING_MESSAGE_HEART: &str = "❤️";

/// Default heartbeat pong payload.
pub const DEFAULT_PONG_MESSAGE_HEART: &str = "💚";

// ============================================================================
// WebsocketOptions
// ============================================================================

/// Per-connection configuration.
#[derive(Clone)]
pub struct WebsocketOptions {
    /// Pool the connection registers with on construction.
    pub connection_pool: Option<ConnectionPool>,

    /// Inbound message callbacks.
    pub processor: Option<Arc<dyn MessageProcessor>>,

    /// Parent span for the connection's pumps.
    pub span: Option<Span>,

    /// Reply to an inbound ping heartbeat with the pong heartbeat.
    pub auto_reply_pong: bool,

    /// Keep Ping frames and ping heartbeats away from the processor.
    pub skip_ping_message: bool,

    /// Keep Pong frames and pong heartbeats away from the processor.
    pub skip_pong_message: bool,

    /// Heartbeat payload sent by [`Websocket::ping`](crate::Websocket::ping).
    pub ping_message_heart: String,

    /// Heartbeat reply payload.
    pub pong_message_heart: String,

    /// Maximum inbound message size in bytes.
    pub read_limit: usize,

    /// Time allowed between two inbound messages.
    pub read_deadline: Duration,

    /// Time allowed for a single write.
    pub write_deadline: Duration,

    /// Interval between heartbeat pings.
    pub ping_message_period: Duration,
}

impl Default for WebsocketOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WebsocketOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketOptions")
            .field("connection_pool", &self.connection_pool.is_some())
            .field("processor", &self.processor.is_some())
            .field("auto_reply_pong", &self.auto_reply_pong)
            .field("skip_ping_message", &self.skip_ping_message)
            .field("skip_pong_message", &self.skip_pong_message)
            .field("ping_message_heart", &self.ping_message_heart)
            .field("pong_message_heart", &self.pong_message_heart)
            .field("read_limit", &self.read_limit)
            .field("read_deadline", &self.read_deadline)
            .field("write_deadline", &self.write_deadline)
            .field("ping_message_period", &self.ping_message_period)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl WebsocketOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connection_pool: None,
            processor: None,
            span: None,
            auto_reply_pong: false,
            skip_ping_message: true,
            skip_pong_message: true,
            ping_message_heart: DEFAULT_PING_MESSAGE_HEART.to_string(),
            pong_message_heart: DEFAULT_PONG_MESSAGE_HEART.to_string(),
            read_limit: DEFAULT_READ_LIMIT,
            read_deadline: DEFAULT_READ_DEADLINE,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            ping_message_period: DEFAULT_PING_MESSAGE_PERIOD,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl WebsocketOptions {
    /// Registers the connection with `pool` on construction.
    #[inline]
    #[must_use]
    pub fn with_connection_pool(mut self, pool: ConnectionPool) -> Self {
        self.connection_pool = Some(pool);
        self
    }

    /// Sets the inbound message processor.
    ///
    /// An error returned by the processor closes the connection.
    #[inline]
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Sets the parent span used for the connection's log output.
    #[inline]
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Enables or disables replying to ping heartbeats.
    #[inline]
    #[must_use]
    pub fn with_auto_reply_pong(mut self, auto_reply_pong: bool) -> Self {
        self.auto_reply_pong = auto_reply_pong;
        self
    }

    /// Chooses whether ping and pong messages are hidden from the processor.
    #[inline]
    #[must_use]
    pub fn with_on_message_skip_strategy(mut self, skip_ping: bool, skip_pong: bool) -> Self {
        self.skip_ping_message = skip_ping;
        self.skip_pong_message = skip_pong;
        self
    }

    /// Sets the heartbeat ping payload.
    #[inline]
    #[must_use]
    pub fn with_ping_message_heart(mut self, heart: impl Into<String>) -> Self {
        self.ping_message_heart = heart.into();
        self
    }

    /// Sets the heartbeat pong payload.
    #[inline]
    #[must_use]
    pub fn with_pong_message_heart(mut self, heart: impl Into<String>) -> Self {
        self.pong_message_heart = heart.into();
        self
    }

    /// Sets the maximum inbound message size in bytes.
    ///
    /// Larger messages close the connection.
    #[inline]
    #[must_use]
    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit;
        self
    }

    /// Sets the read deadline.
    #[inline]
    #[must_use]
    pub fn with_read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline = deadline;
        self
    }

    /// Sets the write deadline.
    #[inline]
    #[must_use]
    pub fn with_write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline = deadline;
        self
    }

    /// Sets the heartbeat ping interval.
    #[inline]
    #[must_use]
    pub fn with_ping_message_period(mut self, period: Duration) -> Self {
        self.ping_message_period = period;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WebsocketOptions::default();
        assert!(options.connection_pool.is_none());
        assert!(options.processor.is_none());
        assert!(!options.auto_reply_pong);
        assert!(options.skip_ping_message);
        assert!(options.skip_pong_message);
        assert_eq!(options.ping_message_heart, "❤️");
        assert_eq!(options.pong_message_heart, "💚");
        assert_eq!(options.read_limit, 4 * 1024 * 1024);
        assert_eq!(options.read_deadline, Duration::from_secs(60));
        assert_eq!(options.write_deadline, Duration::from_secs(60));
        assert_eq!(options.ping_message_period, Duration::from_secs(20));
    }

    #[test]
    fn test_builder_chain() {
        let options = WebsocketOptions::new()
            .with_auto_reply_pong(true)
            .with_on_message_skip_strategy(false, true)
            .with_read_limit(1024)
            .with_read_deadline(Duration::from_millis(500))
            .with_write_deadline(Duration::from_millis(250))
            .with_ping_message_period(Duration::from_millis(100))
            .with_ping_message_heart("ping")
            .with_pong_message_heart("pong");

        assert!(options.auto_reply_pong);
        assert!(!options.skip_ping_message);
        assert!(options.skip_pong_message);
        assert_eq!(options.read_limit, 1024);
        assert_eq!(options.read_deadline, Duration::from_millis(500));
        assert_eq!(options.write_deadline, Duration::from_millis(250));
        assert_eq!(options.ping_message_period, Duration::from_millis(100));
        assert_eq!(options.ping_message_heart, "ping");
        assert_eq!(options.pong_message_heart, "pong");
    }

    #[test]
    fn test_debug_hides_processor() {
        let rendered = format!("{:?}", WebsocketOptions::new());
        assert!(rendered.contains("processor: false"));
        assert!(rendered.contains("read_limit: 4194304"));
    }
}
