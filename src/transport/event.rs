use async_trait::async_trait;
use std::fmt::Debug;

use crate::codec::{Codec, JsonCodec};
use crate::error::TransportResult;
use crate::message::Event;
use crate::transport::{Transport, TransportStats};

/// Named-event transport the router multiplexes over.
#[async_trait]
pub trait EventTransport: Send + Sync + Debug {
    async fn send(&self, event: &Event) -> TransportResult<()>;
    async fn recv(&self) -> TransportResult<Event>;
    fn is_connected(&self) -> bool;
    fn is_healthy(&self) -> bool {
        self.is_connected()
    }
    async fn close(&self) -> TransportResult<()>;
    fn stats(&self) -> Option<TransportStats> {
        None
    }
}

/// Carries events over a byte [`Transport`], one codec-encoded event per frame.
#[derive(Debug)]
pub struct EventTransportAdapter<T: Transport, C: Codec = JsonCodec> {
    inner: T,
    codec: C,
}

impl<T: Transport> EventTransportAdapter<T, JsonCodec> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: transport,
            codec: JsonCodec,
        }
    }
}

impl<T: Transport, C: Codec> EventTransportAdapter<T, C> {
    pub fn with_codec(transport: T, codec: C) -> Self {
        Self {
            inner: transport,
            codec,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transport, C: Codec> EventTransport for EventTransportAdapter<T, C> {
    async fn send(&self, event: &Event) -> TransportResult<()> {
        let bytes = self.codec.encode(event)?;
        self.inner.send(&bytes).await
    }

    async fn recv(&self) -> TransportResult<Event> {
        let bytes = self.inner.recv().await?;
        self.codec.decode(&bytes)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner.close().await
    }

    fn stats(&self) -> Option<TransportStats> {
        self.inner.stats()
    }
}
