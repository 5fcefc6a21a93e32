//! Managed WebSocket connection with read and write pumps.
//!
//! # Pumps
//!
//! [`Websocket::open`] spawns two tokio tasks per connection:
//!
//! - **Read pump**: reads inbound messages under a renewable read deadline
//!   and hands them to the configured [`MessageProcessor`](crate::MessageProcessor).
//! - **Write pump**: drains the outbound queue under the write deadline and
//!   sends a heartbeat every ping period.
//!
//! Both pumps watch the connection's close signal and call
//! [`Websocket::close`] when they exit, whatever the reason. Close is
//! idempotent, so the first trigger wins and every later call is a no-op.
//!
//! # Dead Peers
//!
//! Any successful read renews the read deadline. A peer that stays silent
//! longer than the deadline (heartbeat replies included) fails the pending
//! read, which tears the connection down and removes it from its pool.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout, timeout_at};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Bytes, Message, Utf8Bytes};
use tracing::{Instrument, Span, debug, debug_span, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::options::WebsocketOptions;

use super::socket::{MessageReader, MessageWriter, Socket};

// ============================================================================
// Constants
// ============================================================================

/// Payload written by `write_json` when serialization fails.
const EMPTY_JSON_OBJECT: &[u8] = b"{}";

/// Upper bound for sending the close frame during teardown.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Lower bound for the heartbeat period.
const MIN_PING_MESSAGE_PERIOD: Duration = Duration::from_millis(1);

// ============================================================================
// ConnectionInfo
// ============================================================================

/// Identity of the request that opened a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Address of the remote peer.
    pub remote_addr: Option<SocketAddr>,
    /// Request URI of the upgrade request.
    pub request_uri: String,
}

impl ConnectionInfo {
    /// Creates connection info from a peer address and request URI.
    #[inline]
    #[must_use]
    pub fn new(remote_addr: SocketAddr, request_uri: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            request_uri: request_uri.into(),
        }
    }
}

// ============================================================================
// Websocket
// ============================================================================

/// A managed WebSocket connection.
///
/// Cheap to clone; clones share the same connection. The socket itself is
/// only ever touched by the two pumps and by the close path.
#[derive(Clone)]
pub struct Websocket {
    inner: Arc<Inner>,
}

struct Inner {
    id: ConnectionId,
    info: ConnectionInfo,
    options: WebsocketOptions,
    span: Span,

    /// Set exactly once by the first `close()`.
    closed: AtomicBool,

    /// Writer half, shared by the write pump and the close path.
    writer: AsyncMutex<Box<dyn MessageWriter>>,

    /// Outbound queue. Taken (and so released) on close.
    write_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,

    /// Close signal observed by both pumps.
    close_tx: watch::Sender<bool>,

    /// Reader half and queue receiver, taken by `open()` or `close()`.
    pumps: Mutex<Option<PumpParts>>,
}

struct PumpParts {
    reader: Box<dyn MessageReader>,
    write_rx: mpsc::UnboundedReceiver<Bytes>,
}

impl fmt::Debug for Websocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Websocket")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.info.remote_addr)
            .field("request_uri", &self.inner.info.request_uri)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Websocket - Constructor
// ============================================================================

impl Websocket {
    /// Wraps an established socket.
    ///
    /// Applies the read limit, and registers with the configured pool if
    /// there is one. The pumps do not run until [`open`](Self::open).
    pub fn new(socket: impl Socket, info: ConnectionInfo, options: WebsocketOptions) -> Self {
        let (mut reader, writer) = socket.into_split();
        reader.set_read_limit(options.read_limit);

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (close_tx, _) = watch::channel(false);

        let id = ConnectionId::next();
        let parent = options.span.clone().unwrap_or_else(Span::current);
        let span = debug_span!(
            parent: &parent,
            "websocket",
            connection_id = %id,
            remote_addr = ?info.remote_addr
        );

        let websocket = Self {
            inner: Arc::new(Inner {
                id,
                info,
                options,
                span,
                closed: AtomicBool::new(false),
                writer: AsyncMutex::new(writer),
                write_tx: Mutex::new(Some(write_tx)),
                close_tx,
                pumps: Mutex::new(Some(PumpParts { reader, write_rx })),
            }),
        };

        if let Some(pool) = &websocket.inner.options.connection_pool {
            pool.add(websocket.clone());
        }

        websocket
    }

    /// Spawns the read and write pumps.
    ///
    /// Must be called from within a tokio runtime. Calling it again is a no-op.
    pub fn open(&self) {
        let Some(PumpParts { reader, write_rx }) = self.inner.pumps.lock().take() else {
            debug!(connection_id = %self.inner.id, "Pumps already started or connection closed");
            return;
        };

        let close_rx = self.inner.close_tx.subscribe();

        tokio::spawn(
            self.clone()
                .read_pump(reader, close_rx.clone())
                .instrument(self.inner.span.clone()),
        );
        tokio::spawn(
            self.clone()
                .write_pump(write_rx, close_rx)
                .instrument(self.inner.span.clone()),
        );
    }
}

// ============================================================================
// Websocket - Accessors
// ============================================================================

impl Websocket {
    /// Returns the connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the remote peer address, if known.
    #[inline]
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.info.remote_addr
    }

    /// Returns the request URI the connection was opened with.
    #[inline]
    #[must_use]
    pub fn request_uri(&self) -> &str {
        &self.inner.info.request_uri
    }

    /// Returns `true` once the connection has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Waits until the connection is closed.
    pub async fn closed(&self) {
        let mut close_rx = self.inner.close_tx.subscribe();
        wait_closed(&mut close_rx).await;
    }
}

// ============================================================================
// Websocket - Writing
// ============================================================================

impl Websocket {
    /// Queues a message for the write pump.
    ///
    /// Valid UTF-8 goes out as a text frame, anything else as a binary
    /// frame. Messages written after close are dropped silently. Never
    /// blocks: the queue is unbounded.
    pub fn write(&self, message: impl Into<Bytes>) {
        if self.is_closed() {
            return;
        }

        if let Some(write_tx) = self.inner.write_tx.lock().as_ref() {
            let _ = write_tx.send(message.into());
        }
    }

    /// Queues `value` serialized as JSON.
    ///
    /// If serialization fails, `{}` is written instead and the caller is not
    /// told.
    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T) {
        let payload = serde_json::to_vec(value).unwrap_or_else(|e| {
            warn!(connection_id = %self.inner.id, error = %e, "Failed to serialize JSON message");
            EMPTY_JSON_OBJECT.to_vec()
        });

        self.write(payload);
    }

    /// Sends one heartbeat message immediately, bypassing the queue.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::WriteDeadlineExceeded`] if the write does not finish in time
    /// - [`Error::WebSocket`] if the transport fails
    pub async fn ping(&self) -> Result<()> {
        let heart = self.inner.options.ping_message_heart.clone();
        self.write_frame(Message::text(heart)).await
    }

    /// Writes one message to the socket under the write deadline.
    ///
    /// The close signal abandons a pending write, which releases the writer.
    async fn write_frame(&self, message: Message) -> Result<()> {
        let deadline = self.inner.options.write_deadline;
        let mut close_rx = self.inner.close_tx.subscribe();

        let write = timeout(deadline, async {
            let mut writer = self.inner.writer.lock().await;
            if self.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            writer.write_message(message).await
        });

        tokio::select! {
            biased;

            () = wait_closed(&mut close_rx) => Err(Error::ConnectionClosed),

            result = write => result.map_err(|_| Error::write_deadline(millis(deadline)))?,
        }
    }
}

// ============================================================================
// Websocket - Lifecycle
// ============================================================================

impl Websocket {
    /// Closes the connection.
    ///
    /// Stops both pumps, releases the outbound queue, leaves the pool, then
    /// sends a normal close frame (best effort) and closes the socket. Only
    /// the first call does anything; it is safe to call from any task.
    pub async fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        // Signal first: a write pump stuck on a dead peer lets go of the writer.
        self.inner.close_tx.send_replace(true);
        self.inner.write_tx.lock().take();
        self.inner.pumps.lock().take();

        if let Some(pool) = &self.inner.options.connection_pool {
            pool.remove(self);
        }

        let deadline = self.inner.options.write_deadline.min(CLOSE_FRAME_TIMEOUT);
        let shutdown = timeout(deadline, async {
            let mut writer = self.inner.writer.lock().await;
            if let Err(e) = writer.write_message(normal_close_message()).await {
                trace!(connection_id = %self.inner.id, error = %e, "Close frame not sent");
            }
            writer.close().await
        })
        .await;

        match shutdown {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection_id = %self.inner.id, error = %e, "Socket close failed");
            }
            Err(_) => {
                debug!(connection_id = %self.inner.id, "Socket close timed out");
            }
        }

        debug!(
            connection_id = %self.inner.id,
            remote_addr = ?self.inner.info.remote_addr,
            "Connection closed"
        );
    }

    /// Sends `{"error": "<err>"}` to the peer (best effort), then closes.
    pub async fn close_with_error(&self, err: impl fmt::Display) {
        let payload = serde_json::json!({ "error": err.to_string() }).to_string();

        if let Err(e) = self.write_frame(Message::text(payload)).await {
            debug!(connection_id = %self.inner.id, error = %e, "Failed to send error message");
        }

        self.close().await;
    }
}

// ============================================================================
// Websocket - Pumps
// ============================================================================

impl Websocket {
    /// Reads inbound messages until an error, a peer close or the close signal.
    async fn read_pump(
        self,
        mut reader: Box<dyn MessageReader>,
        mut close_rx: watch::Receiver<bool>,
    ) {
        let read_deadline = self.inner.options.read_deadline;
        let mut deadline = Instant::now() + read_deadline;

        trace!("Read pump started");

        loop {
            let result = tokio::select! {
                biased;

                () = wait_closed(&mut close_rx) => break,

                result = timeout_at(deadline, reader.read_message()) => {
                    result.unwrap_or_else(|_| Err(Error::read_deadline(millis(read_deadline))))
                }
            };

            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    log_read_error(&e);
                    break;
                }
            };

            // Any inbound traffic proves the peer is alive.
            deadline = Instant::now() + read_deadline;

            match self.dispatch(message).await {
                Ok(()) => {}
                Err(Error::Processing { message }) => {
                    warn!(error = %message, "Failed to process message");
                    self.close_with_error(message).await;
                    break;
                }
                Err(e) => {
                    log_read_error(&e);
                    break;
                }
            }
        }

        self.close().await;
        trace!("Read pump terminated");
    }

    /// Sends queued messages and heartbeats until a write fails or the close signal.
    async fn write_pump(
        self,
        mut write_rx: mpsc::UnboundedReceiver<Bytes>,
        mut close_rx: watch::Receiver<bool>,
    ) {
        let period = self.inner.options.ping_message_period.max(MIN_PING_MESSAGE_PERIOD);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        trace!("Write pump started");

        loop {
            tokio::select! {
                biased;

                () = wait_closed(&mut close_rx) => break,

                message = write_rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };

                    if let Err(e) = self.write_frame(outbound_message(message)).await {
                        if !self.is_closed() {
                            warn!(error = %e, "Failed to write message");
                        }
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.ping().await {
                        if !self.is_closed() {
                            warn!(error = %e, "Failed to send ping message");
                        }
                        break;
                    }
                }
            }
        }

        drop(ticker);
        self.close().await;
        trace!("Write pump terminated");
    }

    /// Hands one inbound message to the processor.
    ///
    /// Returns [`Error::PeerClosed`] for close frames and
    /// [`Error::Processing`] when the processor rejects the message.
    async fn dispatch(&self, message: Message) -> Result<()> {
        let options = &self.inner.options;

        if let Message::Close(frame) = &message {
            return Err(match frame {
                Some(frame) => Error::peer_closed(u16::from(frame.code), frame.reason.as_str()),
                None => Error::peer_closed(u16::from(CloseCode::Status), ""),
            });
        }

        if options.auto_reply_pong
            && let Message::Text(text) = &message
            && text.as_str() == options.ping_message_heart
        {
            self.write(options.pong_message_heart.clone());
        }

        if self.is_skipped(&message) {
            return Ok(());
        }

        let Some(processor) = &options.processor else {
            return Ok(());
        };

        let result = match message {
            Message::Text(text) => processor.on_text_message(self, text.into()).await,
            Message::Binary(data) => processor.on_binary_message(self, data).await,
            Message::Ping(payload) => processor.on_ping_message(self, payload).await,
            Message::Pong(payload) => processor.on_pong_message(self, payload).await,
            Message::Close(_) | Message::Frame(_) => Ok(()),
        };

        result.map_err(|e| Error::processing(e.to_string()))
    }

    /// Returns `true` if the message is a heartbeat hidden from the processor.
    fn is_skipped(&self, message: &Message) -> bool {
        let options = &self.inner.options;
        match message {
            Message::Ping(_) => options.skip_ping_message,
            Message::Pong(_) => options.skip_pong_message,
            Message::Text(text) if text.as_str() == options.ping_message_heart => {
                options.skip_ping_message
            }
            Message::Text(text) if text.as_str() == options.pong_message_heart => {
                options.skip_pong_message
            }
            _ => false,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves once the close signal is set or its sender is gone.
pub(crate) async fn wait_closed(close_rx: &mut watch::Receiver<bool>) {
    let _ = close_rx.wait_for(|closed| *closed).await;
}

fn log_read_error(err: &Error) {
    if err.is_expected_close() {
        debug!(error = %err, "Connection ended");
    } else {
        warn!(error = %err, "Failed to read message");
    }
}

fn normal_close_message() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static(""),
    }))
}

/// Text frame for UTF-8 payloads, binary frame otherwise.
fn outbound_message(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
