use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::error::{Result, RouterError};
use crate::message::envelope::Envelope;
use crate::message::types::ResponseId;

/// Outstanding `invoke` calls waiting for their reply envelope.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<PendingInner>,
}

#[derive(Debug, Default)]
struct PendingInner {
    waiting: HashMap<ResponseId, oneshot::Sender<Envelope>>,
    closed: bool,
}

impl PendingRequests {
    pub fn register(&self, id: ResponseId) -> Result<oneshot::Receiver<Envelope>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RouterError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        inner.waiting.insert(id, tx);
        Ok(rx)
    }

    /// Hands `reply` to its waiter. Gives the envelope back if nobody waits on `id`.
    pub fn resolve(&self, id: &ResponseId, reply: Envelope) -> Option<Envelope> {
        let Some(tx) = self.inner.lock().waiting.remove(id) else {
            return Some(reply);
        };
        // A waiter that already timed out has dropped its receiver.
        let _ = tx.send(reply);
        None
    }

    pub fn remove(&self, id: &ResponseId) {
        self.inner.lock().waiting.remove(id);
    }

    /// Fail every waiter and refuse new registrations.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.waiting.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let pending = PendingRequests::default();
        let id = ResponseId::new();
        let rx = pending.register(id.clone()).unwrap();

        let reply = Envelope::reply("sum", json!(6), &id);
        assert!(pending.resolve(&id, reply.clone()).is_none());
        assert_eq!(rx.await.unwrap(), reply);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_unknown_id_returns_envelope() {
        let pending = PendingRequests::default();
        let id = ResponseId::new();
        let envelope = Envelope::reply("sum", json!(1), &id);
        assert_eq!(pending.resolve(&id, envelope.clone()), Some(envelope));
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let pending = PendingRequests::default();
        let rx = pending.register(ResponseId::new()).unwrap();

        pending.close();
        assert!(rx.await.is_err());
        assert!(matches!(
            pending.register(ResponseId::new()),
            Err(RouterError::ConnectionClosed)
        ));
    }
}
