//! Broadcast connection pool.
//!
//! A single control loop task owns the membership set. Every operation,
//! whether `add`, `remove`, `broadcast`, a count query or `close`, is a
//! command sent to that loop, so membership is never touched from two
//! tasks at once.
//!
//! # Architecture
//!
//! ```text
//! add / remove / broadcast            ┌──────────────────────────┐
//! ───────────────────────────────────►│ control loop (1 task)    │
//!          PoolCommand (mpsc)         │  ConnectionId → Websocket│
//!                                     └────────────┬─────────────┘
//!                                                  │ write()
//!                                   ┌──────────────┼──────────────┐
//!                                   ▼              ▼              ▼
//!                              Websocket 1    Websocket 2    Websocket 3
//! ```
//!
//! A broadcast sees the membership as it stood when the loop dequeued it.
//! Writes are queued per connection, so one slow peer never holds up the
//! others.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Bytes;
use tracing::{debug, info, trace};

use crate::identifiers::ConnectionId;

use super::connection::{Websocket, wait_closed};

// ============================================================================
// PoolCommand
// ============================================================================

/// Requests handled by the control loop.
enum PoolCommand {
    /// Register a connection.
    Add(Websocket),
    /// Drop a connection from the membership set.
    Remove(ConnectionId),
    /// Write a message to every member.
    Broadcast(Bytes),
    /// Report the membership size.
    Count(oneshot::Sender<usize>),
    /// Close every member, raise the close signal and stop the loop.
    Close,
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Registry of live connections with broadcast fan-out.
///
/// Cheap to clone; clones share the same control loop.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::new();
/// let options = WebsocketOptions::new().with_connection_pool(pool.clone());
///
/// // Connections built with `options` join the pool on construction
/// // and leave it when they close.
/// pool.broadcast("hello everyone");
///
/// pool.close().await;
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    /// Channel into the control loop.
    command_tx: mpsc::UnboundedSender<PoolCommand>,
    /// Set exactly once by the first `close()`.
    closed: AtomicBool,
    /// Close signal, raised by the control loop once every member is closed.
    close_rx: watch::Receiver<bool>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Creates an empty pool and starts its control loop.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);

        tokio::spawn(Self::run_control_loop(command_rx, close_tx));

        debug!("ConnectionPool started");

        Self {
            shared: Arc::new(PoolShared {
                command_tx,
                closed: AtomicBool::new(false),
                close_rx,
            }),
        }
    }
}

// ============================================================================
// ConnectionPool - Public API
// ============================================================================

impl ConnectionPool {
    /// Registers a connection.
    ///
    /// Connections built with this pool in their options are added
    /// automatically.
    pub fn add(&self, websocket: Websocket) {
        self.send(PoolCommand::Add(websocket));
    }

    /// Removes a connection. Unknown connections are ignored.
    pub fn remove(&self, websocket: &Websocket) {
        self.send(PoolCommand::Remove(websocket.id()));
    }

    /// Writes `message` to every current member.
    pub fn broadcast(&self, message: impl Into<Bytes>) {
        self.send(PoolCommand::Broadcast(message.into()));
    }

    /// Returns the number of members.
    ///
    /// Answered by the control loop, so every earlier `add`/`remove` is
    /// accounted for. Returns 0 once the pool is closed.
    pub async fn connection_count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PoolCommand::Count(reply_tx));
        reply_rx.await.unwrap_or(0)
    }

    /// Returns `true` once the pool has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Subscribes to the pool's close signal.
    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.shared.close_rx.clone()
    }

    fn send(&self, command: PoolCommand) {
        // Members leaving during close land here too.
        if self.is_closed() {
            trace!("Pool closed, command dropped");
            return;
        }

        if self.shared.command_tx.send(command).is_err() {
            debug!("Pool control loop stopped, command dropped");
        }
    }
}

// ============================================================================
// ConnectionPool - Lifecycle
// ============================================================================

impl ConnectionPool {
    /// Closes every member, then stops the control loop.
    ///
    /// Only the first call does the work. Every call, concurrent ones
    /// included, resolves once all members are closed.
    pub async fn close(&self) {
        let first = self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if first {
            info!("ConnectionPool shutting down");
            // A stopped loop has dropped the signal sender, which also ends the wait.
            let _ = self.shared.command_tx.send(PoolCommand::Close);
        }

        let mut close_rx = self.close_signal();
        wait_closed(&mut close_rx).await;

        if first {
            info!("ConnectionPool shutdown complete");
        }
    }
}

// ============================================================================
// ConnectionPool - Control Loop
// ============================================================================

impl ConnectionPool {
    /// Owns the membership set until `close` or until every handle is gone.
    async fn run_control_loop(
        mut command_rx: mpsc::UnboundedReceiver<PoolCommand>,
        close_tx: watch::Sender<bool>,
    ) {
        let mut members: FxHashMap<ConnectionId, Websocket> = FxHashMap::default();

        trace!("Pool control loop started");

        while let Some(command) = command_rx.recv().await {
            match command {
                PoolCommand::Add(websocket) => {
                    let connection_id = websocket.id();
                    let remote_addr = websocket.remote_addr();
                    members.insert(connection_id, websocket);
                    debug!(
                        %connection_id,
                        ?remote_addr,
                        total = members.len(),
                        "Connection joined pool"
                    );
                }

                PoolCommand::Remove(connection_id) => {
                    if let Some(websocket) = members.remove(&connection_id) {
                        debug!(
                            %connection_id,
                            remote_addr = ?websocket.remote_addr(),
                            total = members.len(),
                            "Connection left pool"
                        );
                    }
                }

                PoolCommand::Broadcast(message) => {
                    for websocket in members.values() {
                        websocket.write(message.clone());
                    }
                    trace!(clients = members.len(), "Broadcast message");
                }

                PoolCommand::Count(reply_tx) => {
                    let _ = reply_tx.send(members.len());
                }

                PoolCommand::Close => {
                    let closing: Vec<Websocket> = members.drain().map(|(_, ws)| ws).collect();
                    let count = closing.len();

                    join_all(closing.iter().map(|websocket| websocket.close())).await;

                    debug!(count, "Closed pool members");
                    close_tx.send_replace(true);
                    break;
                }
            }
        }

        // Removals queued by closing members are discarded with the receiver.
        trace!("Pool control loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
