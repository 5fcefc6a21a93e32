//! Publish/subscribe bridges into a [`ConnectionPool`].
//!
//! Two adapter shapes cover the usual pub/sub clients:
//!
//! - **Stream driver**: [`ConnectionPool::subscribe`] consumes any stream of
//!   payloads in its own task (an mpsc receiver, a Redis message stream
//!   mapped to payloads, ...).
//! - **Callback hooks**: [`ConnectionPool::pubsub_hooks`] returns a
//!   [`PubSubHooks`] value for clients that push messages through a
//!   callback.
//!
//! Both forward payload bytes to [`ConnectionPool::broadcast`] unchanged.
//! Delivery guarantees are whatever the pub/sub client provides.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::Bytes;
use tracing::{debug, trace};

use crate::transport::ConnectionPool;
use crate::transport::connection::wait_closed;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for each pushed message.
pub type MessageHook = Arc<dyn Fn(PubSubMessage) + Send + Sync>;

/// A message delivered by a pub/sub client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Message payload.
    pub payload: Bytes,
}

impl PubSubMessage {
    /// Creates a message.
    #[inline]
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

// ============================================================================
// PubSubHooks
// ============================================================================

/// Callback set for push-style pub/sub clients.
#[derive(Clone)]
pub struct PubSubHooks {
    /// Called with every received message.
    pub on_message: MessageHook,
}

impl PubSubHooks {
    /// Invokes the message hook.
    #[inline]
    pub fn dispatch(&self, message: PubSubMessage) {
        (self.on_message)(message);
    }
}

impl fmt::Debug for PubSubHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSubHooks").finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionPool - Pub/Sub
// ============================================================================

impl ConnectionPool {
    /// Broadcasts every item of `source` until it ends or the pool closes.
    ///
    /// The stream is driven in its own task and dropped when the task
    /// ends. Must be called from within a tokio runtime.
    pub fn subscribe<S>(&self, source: S) -> &Self
    where
        S: Stream + Send + 'static,
        S::Item: Into<Bytes> + Send,
    {
        let pool = self.clone();
        let mut close_rx = self.close_signal();

        tokio::spawn(async move {
            let mut source = Box::pin(source);

            loop {
                tokio::select! {
                    biased;

                    () = wait_closed(&mut close_rx) => {
                        debug!("Pool closed, subscription stopped");
                        break;
                    }

                    item = source.next() => {
                        let Some(item) = item else {
                            debug!("Subscription source ended");
                            break;
                        };
                        trace!("Forwarding published message");
                        pool.broadcast(item);
                    }
                }
            }
        });

        self
    }

    /// Returns hooks that broadcast every pushed message's payload.
    #[must_use]
    pub fn pubsub_hooks(&self) -> PubSubHooks {
        let pool = self.clone();
        PubSubHooks {
            on_message: Arc::new(move |message: PubSubMessage| {
                trace!(channel = %message.channel, "Forwarding published message");
                pool.broadcast(message.payload);
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
