use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

use crate::error::TransportResult;

pub mod channel;
pub mod event;
pub mod tcp;
#[cfg(feature = "ws")]
pub mod ws;

/// Byte-frame transport: one `send` is one frame on the other side's `recv`.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send one frame
    async fn send(&self, data: &[u8]) -> TransportResult<()>;

    /// Receive the next frame
    async fn recv(&self) -> TransportResult<Bytes>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Check if the transport is healthy
    fn is_healthy(&self) -> bool {
        self.is_connected()
    }

    /// Close the transport
    async fn close(&self) -> TransportResult<()>;

    /// Get transport statistics
    fn stats(&self) -> Option<TransportStats> {
        None
    }

    /// Get transport name/identifier
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Statistics collected by transport implementations
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
    }
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transport Statistics:")?;
        writeln!(f, "  Messages sent:     {}", self.messages_sent)?;
        writeln!(f, "  Messages received: {}", self.messages_received)?;
        writeln!(f, "  Bytes sent:        {}", self.bytes_sent)?;
        writeln!(f, "  Bytes received:    {}", self.bytes_received)?;
        writeln!(f, "  Send errors:       {}", self.send_errors)?;
        writeln!(f, "  Receive errors:    {}", self.recv_errors)?;
        Ok(())
    }
}
