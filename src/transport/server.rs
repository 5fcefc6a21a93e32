//! WebSocket upgrade helpers.
//!
//! Accepting TCP connections and performing the server handshake is left to
//! tokio-tungstenite. These helpers only capture what a [`Websocket`] needs
//! from the upgrade request (peer address and request URI) and apply the
//! read limit at the frame level as well.
//!
//! # Connection Flow
//!
//! 1. `WebsocketServer::bind` binds a TCP listener
//! 2. `WebsocketServer::accept` waits for a peer and upgrades it
//! 3. The resulting [`Websocket`] is registered with its pool and opened

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::options::WebsocketOptions;

use super::connection::{ConnectionInfo, Websocket};

// ============================================================================
// Functions
// ============================================================================

/// Upgrades an accepted stream and opens a [`Websocket`] on it.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the handshake fails.
pub async fn accept_websocket<S>(
    stream: S,
    remote_addr: SocketAddr,
    options: WebsocketOptions,
) -> Result<Websocket>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut request_uri = String::new();
    let config = WebSocketConfig::default().max_message_size(Some(options.read_limit));

    let ws_stream = accept_hdr_async_with_config(
        stream,
        |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            request_uri = request.uri().to_string();
            Ok(response)
        },
        Some(config),
    )
    .await
    .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

    info!(?remote_addr, %request_uri, "WebSocket connection established");

    let websocket = Websocket::new(
        ws_stream,
        ConnectionInfo::new(remote_addr, request_uri),
        options,
    );
    websocket.open();

    Ok(websocket)
}

// ============================================================================
// WebsocketServer
// ============================================================================

/// A bound TCP listener that upgrades accepted peers to [`Websocket`]s.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::new();
/// let server = WebsocketServer::bind("127.0.0.1:0").await?;
///
/// loop {
///     let options = WebsocketOptions::new().with_connection_pool(pool.clone());
///     if let Err(e) = server.accept(options).await {
///         tracing::warn!(error = %e, "Accept failed");
///     }
/// }
/// ```
pub struct WebsocketServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the server is bound to.
    local_addr: SocketAddr,
}

impl WebsocketServer {
    /// Binds to `addr`. Use port 0 for a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "WebSocket server bound");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Accepts one peer, upgrades it and opens the connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if accepting the TCP connection fails
    /// - [`Error::Connection`] if the WebSocket handshake fails
    pub async fn accept(&self, options: WebsocketOptions) -> Result<Websocket> {
        let (stream, remote_addr) = self.listener.accept().await?;

        debug!(?remote_addr, "TCP connection accepted");

        accept_websocket(stream, remote_addr, options).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::{Bytes, Message};

    use crate::processor::{BoxError, MessageProcessor};
    use crate::transport::ConnectionPool;

    const HEART: &str = "❤️";

    struct Echo;

    #[async_trait]
    impl MessageProcessor for Echo {
        async fn on_text_message(
            &self,
            websocket: &Websocket,
            message: Bytes,
        ) -> std::result::Result<(), BoxError> {
            websocket.write(message);
            Ok(())
        }

        async fn on_binary_message(
            &self,
            _: &Websocket,
            _: Bytes,
        ) -> std::result::Result<(), BoxError> {
            Err("binary not supported".into())
        }
    }

    async fn next_text<S>(client: &mut S) -> String
    where
        S: futures_util::Stream<
                Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
            > + Unpin,
    {
        loop {
            let message = timeout(Duration::from_secs(2), client.next())
                .await
                .expect("message in time")
                .expect("stream open")
                .expect("valid message");
            match message {
                Message::Text(text) if text.as_str() != HEART => return text.as_str().to_owned(),
                Message::Text(_) | Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = WebsocketServer::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");

        assert!(server.local_addr().port() > 0);
        assert_eq!(
            server.ws_url(),
            format!("ws://127.0.0.1:{}", server.local_addr().port())
        );
    }

    #[tokio::test]
    async fn test_accept_captures_request_uri() {
        let server = WebsocketServer::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("{}/events?room=7", server.ws_url());

        let client = tokio::spawn(async move { connect_async(url).await.expect("connect") });
        let websocket = server.accept(WebsocketOptions::new()).await.expect("accept");
        let (_client, _response) = client.await.expect("client task");

        assert_eq!(websocket.request_uri(), "/events?room=7");
        assert!(websocket.remote_addr().is_some());
        websocket.close().await;
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let server = WebsocketServer::bind("127.0.0.1:0").await.expect("bind");
        let url = server.ws_url();

        let client = tokio::spawn(async move { connect_async(url).await.expect("connect") });
        let websocket = server
            .accept(WebsocketOptions::new().with_processor(Arc::new(Echo)))
            .await
            .expect("accept");
        let (mut client, _) = client.await.expect("client task");

        client
            .send(Message::text(r#"{"type":"sync"}"#))
            .await
            .expect("send");
        assert_eq!(next_text(&mut client).await, r#"{"type":"sync"}"#);

        websocket.close().await;
    }

    #[tokio::test]
    async fn test_pool_broadcast_over_tcp() {
        let pool = ConnectionPool::new();
        let server = WebsocketServer::bind("127.0.0.1:0").await.expect("bind");

        let mut clients = Vec::new();
        for _ in 0..3 {
            let url = server.ws_url();
            let client = tokio::spawn(async move { connect_async(url).await.expect("connect") });
            server
                .accept(WebsocketOptions::new().with_connection_pool(pool.clone()))
                .await
                .expect("accept");
            let (client, _) = client.await.expect("client task");
            clients.push(client);
        }
        assert_eq!(pool.connection_count().await, 3);

        pool.broadcast("hi");
        for client in &mut clients {
            assert_eq!(next_text(client).await, "hi");
        }

        pool.close().await;
        for client in &mut clients {
            let closed = timeout(Duration::from_secs(2), async {
                loop {
                    match client.next().await {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => continue,
                    }
                }
            })
            .await;
            assert!(closed.is_ok());
        }
    }

    #[tokio::test]
    async fn test_client_disconnect_leaves_pool() {
        let pool = ConnectionPool::new();
        let server = WebsocketServer::bind("127.0.0.1:0").await.expect("bind");
        let url = server.ws_url();

        let client = tokio::spawn(async move { connect_async(url).await.expect("connect") });
        let websocket = server
            .accept(WebsocketOptions::new().with_connection_pool(pool.clone()))
            .await
            .expect("accept");
        let (mut client, _) = client.await.expect("client task");

        client.close(None).await.expect("client close");
        timeout(Duration::from_secs(2), websocket.closed())
            .await
            .expect("server side closed");
        assert_eq!(pool.connection_count().await, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_oversized_message_closes_connection() {
        let server = WebsocketServer::bind("127.0.0.1:0").await.expect("bind");
        let url = server.ws_url();

        let client = tokio::spawn(async move { connect_async(url).await.expect("connect") });
        let websocket = server
            .accept(WebsocketOptions::new().with_read_limit(16))
            .await
            .expect("accept");
        let (mut client, _) = client.await.expect("client task");

        let _ = client.send(Message::text("x".repeat(64))).await;
        timeout(Duration::from_secs(2), websocket.closed())
            .await
            .expect("closed after oversized message");
    }
}
