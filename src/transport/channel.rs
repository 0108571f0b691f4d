use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

use crate::error::{TransportError, TransportResult};
use crate::transport::{Transport, TransportStats};

pub const DEFAULT_CAPACITY: usize = 1024;

/// Configuration for in-process channel transport.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Frames buffered per direction before `send` waits
    pub capacity: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

/// In-process transport over a pair of bounded tokio channels.
pub struct ChannelTransport {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    config: ChannelConfig,
    connected: AtomicBool,
    closed: AtomicBool,
    close_signal: Notify,
    stats: Mutex<TransportStats>,
    name: String,
}

impl ChannelTransport {
    /// Create a pair of connected transports.
    pub fn create_pair(name: impl Into<String>, config: ChannelConfig) -> (Self, Self) {
        let name = name.into();
        let capacity = config.capacity.max(1);

        let (tx1, rx1) = mpsc::channel(capacity);
        let (tx2, rx2) = mpsc::channel(capacity);

        let client = Self::new(tx1, rx2, config.clone(), format!("{}-client", name));
        let server = Self::new(tx2, rx1, config, format!("{}-server", name));

        (client, server)
    }

    fn new(
        sender: mpsc::Sender<Bytes>,
        receiver: mpsc::Receiver<Bytes>,
        config: ChannelConfig,
        name: String,
    ) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            config,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            stats: Mutex::new(TransportStats::default()),
            name,
        }
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let bytes = Bytes::copy_from_slice(data);
        let result = match self.config.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, sender.send(bytes))
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                    operation: "send".into(),
                })?,
            None => sender.send(bytes).await,
        };

        match result {
            Ok(()) => {
                self.stats.lock().record_sent(data.len());
                Ok(())
            }
            Err(_) => {
                self.mark_disconnected();
                self.stats.lock().send_errors += 1;
                Err(TransportError::SendFailed {
                    attempts: 1,
                    reason: "Channel closed".into(),
                })
            }
        }
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        // Registered before the flag check so a concurrent `close` is not missed.
        let closing = self.close_signal.notified();
        tokio::pin!(closing);
        closing.as_mut().enable();
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let mut receiver = self.receiver.lock().await;
        let received = tokio::select! {
            _ = &mut closing => None,
            next = receive(&mut receiver, self.config.read_timeout) => Some(next?),
        };
        let Some(next) = received else {
            receiver.close();
            return Err(TransportError::Closed);
        };

        match next {
            Some(bytes) => {
                self.stats.lock().record_received(bytes.len());
                Ok(bytes)
            }
            None => {
                self.mark_disconnected();
                Err(TransportError::Closed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> TransportResult<()> {
        self.mark_disconnected();
        // Dropping our sender ends the peer's receive side once it drains.
        self.sender.lock().take();
        self.closed.store(true, Ordering::Release);
        self.close_signal.notify_waiters();
        if let Ok(mut receiver) = self.receiver.try_lock() {
            receiver.close();
        }
        Ok(())
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn receive(
    receiver: &mut mpsc::Receiver<Bytes>,
    timeout: Option<Duration>,
) -> TransportResult<Option<Bytes>> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, receiver.recv())
            .await
            .map_err(|_| TransportError::Timeout {
                duration_ms: timeout.as_millis() as u64,
                operation: "receive".into(),
            }),
        None => Ok(receiver.recv().await),
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}
