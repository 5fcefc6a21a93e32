//! In-memory socket for unit tests.
//!
//! The peer side sees every message the connection writes (close frames
//! included) and can inject inbound messages or errors.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

use super::socket::{MessageReader, MessageWriter, Socket};

pub(crate) struct ChannelSocket {
    inbound: mpsc::UnboundedReceiver<Result<Message>>,
    outbound: mpsc::UnboundedSender<Message>,
}

/// Test side of a [`ChannelSocket`].
pub(crate) struct Peer {
    pub to_server: mpsc::UnboundedSender<Result<Message>>,
    pub from_server: mpsc::UnboundedReceiver<Message>,
}

pub(crate) fn channel_socket() -> (ChannelSocket, Peer) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    (
        ChannelSocket { inbound, outbound },
        Peer {
            to_server,
            from_server,
        },
    )
}

impl Peer {
    pub fn send_text(&self, text: &str) {
        let _ = self.to_server.send(Ok(Message::text(text)));
    }

    /// Next message written by the connection, if one arrives within 2s.
    pub async fn next(&mut self) -> Option<Message> {
        timeout(Duration::from_secs(2), self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next data message, skipping heartbeats.
    pub async fn next_data(&mut self, heart: &str) -> Option<Message> {
        loop {
            match self.next().await? {
                Message::Text(text) if text.as_str() == heart => continue,
                other => return Some(other),
            }
        }
    }

    /// Everything written so far.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.from_server.try_recv() {
            messages.push(message);
        }
        messages
    }
}

impl Socket for ChannelSocket {
    fn into_split(self) -> (Box<dyn MessageReader>, Box<dyn MessageWriter>) {
        (
            Box::new(ChannelReader {
                inbound: self.inbound,
                read_limit: None,
            }),
            Box::new(ChannelWriter {
                outbound: self.outbound,
                closed: false,
            }),
        )
    }
}

struct ChannelReader {
    inbound: mpsc::UnboundedReceiver<Result<Message>>,
    read_limit: Option<usize>,
}

#[async_trait]
impl MessageReader for ChannelReader {
    async fn read_message(&mut self) -> Result<Message> {
        let message = self.inbound.recv().await.ok_or(Error::ConnectionClosed)??;
        if let Some(limit) = self.read_limit
            && message.len() > limit
        {
            return Err(Error::read_limit(message.len(), limit));
        }
        Ok(message)
    }

    fn set_read_limit(&mut self, limit: usize) {
        self.read_limit = Some(limit);
    }
}

struct ChannelWriter {
    outbound: mpsc::UnboundedSender<Message>,
    closed: bool,
}

#[async_trait]
impl MessageWriter for ChannelWriter {
    async fn write_message(&mut self, message: Message) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.outbound
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
