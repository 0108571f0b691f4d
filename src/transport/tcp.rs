use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{TransportError, TransportResult};
use crate::transport::{Transport, TransportStats};

/// Configuration for TCP transport
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Maximum frame size in bytes
    pub max_message_size: usize,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout (None for no timeout)
    pub read_timeout: Option<Duration>,
    /// Write timeout (None for no timeout)
    pub write_timeout: Option<Duration>,
    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024, // 16 MB
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(30)),
            nodelay: true,
        }
    }
}

impl TcpConfig {
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Length-prefixed TCP transport.
///
/// Frames are a 4-byte big-endian length followed by the frame bytes. The
/// read and write halves are locked separately so a pending `recv` never
/// holds up `send`.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    reader: tokio::sync::Mutex<OwnedReadHalf>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    peer_addr: SocketAddr,
    connected: AtomicBool,
    stats: Mutex<TransportStats>,
}

impl TcpTransport {
    /// Connect to `addr`
    pub async fn connect(addr: SocketAddr, config: TcpConfig) -> TransportResult<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout {
                duration_ms: config.connect_timeout.as_millis() as u64,
                operation: format!("connecting to {}", addr),
            })?
            .map_err(|e| TransportError::ConnectionFailed {
                name: addr.to_string(),
                attempts: 1,
                reason: e.to_string(),
            })?;

        Self::from_stream(stream, config)
    }

    /// Wrap an already established stream
    pub fn from_stream(stream: TcpStream, config: TcpConfig) -> TransportResult<Self> {
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| TransportError::Protocol(format!("Failed to get peer address: {}", e)))?;

        if config.nodelay {
            stream.set_nodelay(true).map_err(|e| {
                TransportError::Protocol(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
        }

        let (reader, writer) = stream.into_split();

        Ok(Self {
            config,
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            peer_addr,
            connected: AtomicBool::new(true),
            stats: Mutex::new(TransportStats::default()),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    async fn write_frame(&self, data: &[u8]) -> TransportResult<()> {
        let len_bytes = (data.len() as u32).to_be_bytes();
        let mut writer = self.writer.lock().await;

        let write_op = async {
            writer.write_all(&len_bytes).await?;
            writer.write_all(data).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        let result = match self.config.write_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, write_op).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                // Part of the frame may be on the wire; the stream is no longer framed.
                Err(_) => Err(format!("write timed out after {:?}", timeout)),
            },
            None => write_op.await.map_err(|e| e.to_string()),
        };

        result.map_err(|reason| {
            self.mark_disconnected();
            self.stats.lock().send_errors += 1;
            TransportError::SendFailed {
                attempts: 1,
                reason,
            }
        })
    }

    async fn read_frame(&self) -> TransportResult<Bytes> {
        let mut reader = self.reader.lock().await;

        // Only the wait for the length prefix is subject to the read
        // timeout; once a frame has started it is read to completion.
        let mut len_bytes = [0u8; 4];
        let read_len = match self.config.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, reader.read_exact(&mut len_bytes))
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                    operation: "TCP read length".to_string(),
                })?,
            None => reader.read_exact(&mut len_bytes).await,
        };
        read_len.map_err(|e| self.read_error(e))?;

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.config.max_message_size {
            // The stream cannot be resynchronised past an unread frame.
            self.mark_disconnected();
            return Err(TransportError::MessageTooLarge {
                size: len,
                max: self.config.max_message_size,
            });
        }

        let mut buffer = vec![0u8; len];
        reader
            .read_exact(&mut buffer)
            .await
            .map_err(|e| self.read_error(e))?;

        Ok(Bytes::from(buffer))
    }

    fn read_error(&self, err: std::io::Error) -> TransportError {
        self.mark_disconnected();
        self.stats.lock().recv_errors += 1;
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::ReceiveFailed {
                attempts: 1,
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        if data.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                max: self.config.max_message_size,
            });
        }

        self.write_frame(data).await?;
        self.stats.lock().record_sent(data.len() + 4); // Include length prefix
        Ok(())
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let frame = self.read_frame().await?;
        self.stats.lock().record_received(frame.len() + 4);
        Ok(frame)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> TransportResult<()> {
        self.mark_disconnected();
        let mut writer = self.writer.lock().await;
        // The peer sees EOF; an already-reset socket is closed either way.
        let _ = writer.shutdown().await;
        Ok(())
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// TCP listener for accepting incoming connections
#[derive(Debug)]
pub struct TcpTransportListener {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpTransportListener {
    /// Bind to a socket address and listen for incoming connections
    pub async fn bind(addr: SocketAddr, config: TcpConfig) -> TransportResult<Self> {
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

    /// Accept an incoming connection
    pub async fn accept(&self) -> TransportResult<TcpTransport> {
        let (stream, addr) =
            self.listener
                .accept()
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    name: "tcp_listener".to_string(),
                    attempts: 1,
                    reason: format!("Failed to accept connection: {}", e),
                })?;

        tracing::debug!(peer = %addr, "accepted TCP connection");
        TcpTransport::from_stream(stream, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_pair(config: TcpConfig) -> (TcpTransport, TcpTransport) {
        let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap(), config.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpTransport::connect(addr, config).await });
        let server = listener.accept().await.unwrap();
        let client = client_task.await.unwrap().unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_tcp_send_recv() {
        let (client, server) = connected_pair(TcpConfig::default()).await;
        assert!(client.is_connected());
        assert!(server.is_connected());

        client.send(b"Hello, TCP!").await.unwrap();
        assert_eq!(server.recv().await.unwrap().as_ref(), b"Hello, TCP!");

        server.send(b"Hello back!").await.unwrap();
        assert_eq!(client.recv().await.unwrap().as_ref(), b"Hello back!");

        let client_stats = client.stats().unwrap();
        assert_eq!(client_stats.messages_sent, 1);
        assert_eq!(client_stats.bytes_sent, 11 + 4);
    }

    #[tokio::test]
    async fn test_send_while_recv_pending() {
        let (client, server) = connected_pair(TcpConfig::default()).await;
        let client = std::sync::Arc::new(client);

        let reader = {
            let client = client.clone();
            tokio::spawn(async move { client.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The pending receive must not block this send.
        client.send(b"ping").await.unwrap();
        assert_eq!(server.recv().await.unwrap().as_ref(), b"ping");

        server.send(b"pong").await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap().as_ref(), b"pong");
    }

    #[tokio::test]
    async fn test_tcp_message_too_large() {
        let (client, _server) =
            connected_pair(TcpConfig::default().with_max_message_size(1024)).await;

        let result = client.send(&vec![0; 2048]).await;
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { .. })
        ));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_write_timeout_disconnects() {
        let config = TcpConfig::default()
            .with_max_message_size(8 * 1024 * 1024)
            .with_write_timeout(Some(Duration::from_millis(50)));
        // The server never reads, so the socket buffers eventually fill.
        let (client, _server) = connected_pair(config).await;
        let frame = vec![7u8; 4 * 1024 * 1024];

        let mut failure = None;
        for _ in 0..64 {
            if let Err(e) = client.send(&frame).await {
                failure = Some(e);
                break;
            }
        }

        assert!(matches!(failure, Some(TransportError::SendFailed { .. })));
        assert!(!client.is_connected());
        assert!(matches!(
            client.send(b"next").await,
            Err(TransportError::NotConnected)
        ));
        assert_eq!(client.stats().unwrap().send_errors, 1);
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let (client, server) = connected_pair(TcpConfig::default()).await;

        client.close().await.unwrap();
        assert!(matches!(server.recv().await, Err(TransportError::Closed)));
        assert!(!server.is_connected());
    }
}
