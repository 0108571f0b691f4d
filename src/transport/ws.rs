//! WebSocket transport.
//!
//! One transport frame per WebSocket message. Frames that are valid UTF-8
//! go out as text messages so JSON-speaking peers (browser sockets, for
//! instance) can read them directly; anything else goes out as binary.
//! Ping and pong control messages are consumed internally.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{TransportError, TransportResult};
use crate::transport::{Transport, TransportStats};

/// Configuration for WebSocket transport
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Maximum frame size in bytes, checked on send and receive
    pub max_message_size: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Option<Duration>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl WsConfig {
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Client-side stream type returned by [`WsTransport::connect`].
pub type ClientStream = MaybeTlsStream<TcpStream>;

pub struct WsTransport<S = ClientStream> {
    sink: tokio::sync::Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: tokio::sync::Mutex<SplitStream<WebSocketStream<S>>>,
    config: WsConfig,
    connected: AtomicBool,
    stats: Mutex<TransportStats>,
    name: String,
}

impl WsTransport<ClientStream> {
    /// Connect to a `ws://` URL
    pub async fn connect(url: &str, config: WsConfig) -> TransportResult<Self> {
        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: config.connect_timeout.as_millis() as u64,
                    operation: format!("connecting to {}", url),
                })?
                .map_err(|e| TransportError::ConnectionFailed {
                    name: url.to_string(),
                    attempts: 1,
                    reason: e.to_string(),
                })?;

        Ok(Self::from_stream(ws_stream, config, url))
    }
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a stream that has completed the WebSocket handshake
    pub fn from_stream(ws_stream: WebSocketStream<S>, config: WsConfig, name: impl Into<String>) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            sink: tokio::sync::Mutex::new(sink),
            stream: tokio::sync::Mutex::new(stream),
            config,
            connected: AtomicBool::new(true),
            stats: Mutex::new(TransportStats::default()),
            name: name.into(),
        }
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn check_size(&self, size: usize) -> TransportResult<()> {
        if size > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.check_size(data.len())?;

        let message = match std::str::from_utf8(data) {
            Ok(text) => WsMessage::Text(text.to_string()),
            Err(_) => WsMessage::Binary(data.to_vec()),
        };

        let mut sink = self.sink.lock().await;
        let result = match self.config.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, sink.send(message))
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                    operation: "WebSocket write".to_string(),
                })?,
            None => sink.send(message).await,
        };

        match result {
            Ok(()) => {
                self.stats.lock().record_sent(data.len());
                Ok(())
            }
            Err(e) => {
                self.mark_disconnected();
                self.stats.lock().send_errors += 1;
                Err(TransportError::SendFailed {
                    attempts: 1,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut stream = self.stream.lock().await;
        loop {
            let data = match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                Some(Ok(WsMessage::Binary(data))) => data,
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                    continue;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!(transport = %self.name, ?frame, "WebSocket closed by peer");
                    self.mark_disconnected();
                    return Err(TransportError::Closed);
                }
                Some(Err(e)) => {
                    self.mark_disconnected();
                    self.stats.lock().recv_errors += 1;
                    return Err(TransportError::ReceiveFailed {
                        attempts: 1,
                        reason: e.to_string(),
                    });
                }
                None => {
                    self.mark_disconnected();
                    return Err(TransportError::Closed);
                }
            };

            self.check_size(data.len())?;
            self.stats.lock().record_received(data.len());
            return Ok(Bytes::from(data));
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> TransportResult<()> {
        self.mark_disconnected();
        let mut sink = self.sink.lock().await;
        // Best effort: the peer may already be gone.
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
        Ok(())
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<S> std::fmt::Debug for WsTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("connected", &self.connected.load(Ordering::Acquire))
            .finish()
    }
}

/// Accepts WebSocket connections on a TCP listener.
#[derive(Debug)]
pub struct WsTransportListener {
    listener: TcpListener,
    config: WsConfig,
}

impl WsTransportListener {
    pub async fn bind(addr: SocketAddr, config: WsConfig) -> TransportResult<Self> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    name: addr.to_string(),
                    attempts: 1,
                    reason: format!("Failed to bind: {}", e),
                })?;

        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TransportError::Protocol(format!("Failed to get local address: {}", e)))
    }

    /// Accept a connection and complete the WebSocket handshake
    pub async fn accept(&self) -> TransportResult<WsTransport<TcpStream>> {
        let (stream, addr) =
            self.listener
                .accept()
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    name: "ws_listener".to_string(),
                    attempts: 1,
                    reason: format!("Failed to accept connection: {}", e),
                })?;

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                name: addr.to_string(),
                attempts: 1,
                reason: format!("WebSocket handshake failed: {}", e),
            })?;

        tracing::debug!(peer = %addr, "accepted WebSocket connection");
        Ok(WsTransport::from_stream(ws_stream, self.config.clone(), addr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_pair() -> (WsTransport, WsTransport<TcpStream>) {
        let listener = WsTransportListener::bind("127.0.0.1:0".parse().unwrap(), WsConfig::default())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move {
            WsTransport::connect(&format!("ws://{}", addr), WsConfig::default()).await
        });
        let server = listener.accept().await.unwrap();
        let client = client_task.await.unwrap().unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_ws_text_and_binary_frames() {
        let (client, server) = connected_pair().await;

        client.send(br#"{"event":"message"}"#).await.unwrap();
        assert_eq!(server.recv().await.unwrap().as_ref(), br#"{"event":"message"}"#);

        server.send(&[0xff, 0x00, 0x01]).await.unwrap();
        assert_eq!(client.recv().await.unwrap().as_ref(), &[0xff, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_ws_close_is_reported() {
        let (client, server) = connected_pair().await;

        client.close().await.unwrap();
        assert!(!client.is_connected());
        assert!(matches!(server.recv().await, Err(TransportError::Closed)));
        assert!(!server.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = WsTransport::connect("ws://127.0.0.1:1/", WsConfig::default()).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed { .. })));
    }
}
