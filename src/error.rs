//! Error types for managed WebSocket connections.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Fallible operations return [`Result<T>`] which uses [`Error`]. Most
//! connection-level failures never reach the caller: they are logged and
//! turned into a connection teardown. The error values still flow through
//! the pumps so they can be classified and logged consistently.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport | [`Error::ConnectionClosed`], [`Error::PeerClosed`], [`Error::Connection`] |
//! | Deadlines | [`Error::ReadDeadlineExceeded`], [`Error::WriteDeadlineExceeded`] |
//! | Limits | [`Error::ReadLimitExceeded`] |
//! | Application | [`Error::Processing`] |
//! | External | [`Error::Io`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The connection is closed (locally or by the stream ending).
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer sent a close frame.
    #[error("Peer closed connection: code={code}, reason={reason}")]
    PeerClosed {
        /// Close code sent by the peer (1005 when the frame carried none).
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// Connection could not be established or upgraded.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // Deadline Errors
    // ========================================================================
    /// No message arrived before the read deadline.
    #[error("Read deadline exceeded after {timeout_ms}ms")]
    ReadDeadlineExceeded {
        /// Deadline length in milliseconds.
        timeout_ms: u64,
    },

    /// A write did not complete before the write deadline.
    #[error("Write deadline exceeded after {timeout_ms}ms")]
    WriteDeadlineExceeded {
        /// Deadline length in milliseconds.
        timeout_ms: u64,
    },

    // ========================================================================
    // Limit Errors
    // ========================================================================
    /// An inbound message is larger than the configured read limit.
    #[error("Message of {size} bytes exceeds read limit of {limit} bytes")]
    ReadLimitExceeded {
        /// Size of the offending message.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    // ========================================================================
    // Application Errors
    // ========================================================================
    /// The message processor rejected an inbound message.
    #[error("Message processing failed: {message}")]
    Processing {
        /// Error reported by the processor.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a peer closed error.
    #[inline]
    pub fn peer_closed(code: u16, reason: impl Into<String>) -> Self {
        Self::PeerClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a read deadline error.
    #[inline]
    pub fn read_deadline(timeout_ms: u64) -> Self {
        Self::ReadDeadlineExceeded { timeout_ms }
    }

    /// Creates a write deadline error.
    #[inline]
    pub fn write_deadline(timeout_ms: u64) -> Self {
        Self::WriteDeadlineExceeded { timeout_ms }
    }

    /// Creates a read limit error.
    #[inline]
    pub fn read_limit(size: usize, limit: usize) -> Self {
        Self::ReadLimitExceeded { size, limit }
    }

    /// Creates a processing error.
    #[inline]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error is an ordinary end of the connection.
    ///
    /// Normal closure (1000), going away (1001) and abnormal closure (1006)
    /// are expected, as is the stream ending or being reset without a
    /// closing handshake. Everything else is worth a warning.
    #[must_use]
    pub fn is_expected_close(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::PeerClosed { code, .. } => is_expected_close_code(*code),
            Self::WebSocket(WsError::ConnectionClosed | WsError::AlreadyClosed) => true,
            Self::WebSocket(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => {
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if this is a deadline error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ReadDeadlineExceeded { .. } | Self::WriteDeadlineExceeded { .. }
        )
    }

    /// Returns `true` if this is a transport level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::PeerClosed { .. }
                | Self::ReadDeadlineExceeded { .. }
                | Self::WriteDeadlineExceeded { .. }
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }
}

/// Close codes that end a connection without being reported as unexpected.
fn is_expected_close_code(code: u16) -> bool {
    // 1005: the close frame carried no status code at all.
    matches!(
        CloseCode::from(code),
        CloseCode::Normal | CloseCode::Away | CloseCode::Abnormal | CloseCode::Status
    )
}

// ============================================================================
// Tests
// ============================================================================
