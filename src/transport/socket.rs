//! Socket provider abstraction.
//!
//! A [`Socket`] is split once into a reader half, owned by the read pump,
//! and a writer half, shared by the write pump and the close path behind a
//! mutex. Any `WebSocketStream` over an async byte stream is a socket.
//!
//! Deadlines are not part of the socket: the pumps wrap each call in
//! `tokio::time::timeout`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

// ============================================================================
// Traits
// ============================================================================

/// Reading half of a socket.
#[async_trait]
pub trait MessageReader: Send {
    /// Reads the next data or control message.
    ///
    /// Returns [`Error::ConnectionClosed`] once the stream has ended.
    async fn read_message(&mut self) -> Result<Message>;

    /// Sets the maximum accepted message size in bytes.
    fn set_read_limit(&mut self, limit: usize);
}

/// Writing half of a socket.
#[async_trait]
pub trait MessageWriter: Send {
    /// Writes a single message and flushes it.
    async fn write_message(&mut self, message: Message) -> Result<()>;

    /// Closes the underlying transport.
    async fn close(&mut self) -> Result<()>;
}

/// An established message socket.
pub trait Socket: Send + 'static {
    /// Splits the socket into its reading and writing halves.
    fn into_split(self) -> (Box<dyn MessageReader>, Box<dyn MessageWriter>);
}

// ============================================================================
// tokio-tungstenite
// ============================================================================

impl<S> Socket for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_split(self) -> (Box<dyn MessageReader>, Box<dyn MessageWriter>) {
        let (sink, stream) = self.split();
        (
            Box::new(StreamReader {
                stream,
                read_limit: None,
            }),
            Box::new(SinkWriter { sink }),
        )
    }
}

/// Reader over the stream half of a `WebSocketStream`.
struct StreamReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    read_limit: Option<usize>,
}

#[async_trait]
impl<S> MessageReader for StreamReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_message(&mut self) -> Result<Message> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(Error::WebSocket(e)),
                None => return Err(Error::ConnectionClosed),
            };

            // Raw frames only show up when reading with a custom config.
            if matches!(message, Message::Frame(_)) {
                continue;
            }

            if let Some(limit) = self.read_limit
                && message.len() > limit
            {
                return Err(Error::read_limit(message.len(), limit));
            }

            return Ok(message);
        }
    }

    fn set_read_limit(&mut self, limit: usize) {
        self.read_limit = Some(limit);
    }
}

/// Writer over the sink half of a `WebSocketStream`.
struct SinkWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> MessageWriter for SinkWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_message(&mut self, message: Message) -> Result<()> {
        self.sink.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
