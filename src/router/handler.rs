use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Result;

/// Receives the payloads delivered on one channel.
pub trait Handler: Send + Sync {
    /// Fails only when the payload does not fit the handler's type.
    fn handle(&self, payload: Value) -> Result<()>;
}

/// Answers `invoke` requests on one channel.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn respond(&self, payload: Value) -> Result<Value>;
}

/// Decodes the payload into `P` before calling `func`.
pub struct TypedHandler<P, F> {
    func: F,
    _phantom: PhantomData<fn(P)>,
}

impl<P, F> TypedHandler<P, F>
where
    P: DeserializeOwned,
    F: Fn(P) + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<P, F> Handler for TypedHandler<P, F>
where
    P: DeserializeOwned,
    F: Fn(P) + Send + Sync,
{
    fn handle(&self, payload: Value) -> Result<()> {
        let payload: P = serde_json::from_value(payload)?;
        (self.func)(payload);
        Ok(())
    }
}

pub struct TypedRequestHandler<Req, Resp, F> {
    func: F,
    _phantom: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F, Fut> TypedRequestHandler<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Resp, F, Fut> RequestHandler for TypedRequestHandler<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    async fn respond(&self, payload: Value) -> Result<Value> {
        let request: Req = serde_json::from_value(payload)?;
        let response = (self.func)(request).await?;
        Ok(serde_json::to_value(response)?)
    }
}

/// What a channel name is bound to. One binding per channel.
#[derive(Clone)]
pub(crate) enum Route {
    Listener(Arc<dyn Handler>),
    Responder(Arc<dyn RequestHandler>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_typed_handler_decodes_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = TypedHandler::new(move |p: Point| sink.lock().push(p));

        handler.handle(json!({"x": 1, "y": 2})).unwrap();
        assert_eq!(*seen.lock(), vec![Point { x: 1, y: 2 }]);
    }

    #[test]
    fn test_typed_handler_rejects_wrong_shape() {
        let handler = TypedHandler::new(|_: Point| panic!("must not be called"));
        let err = handler.handle(json!("not a point")).unwrap_err();
        assert!(matches!(err, RouterError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_request_handler_round_trip() {
        let handler = TypedRequestHandler::new(|p: Point| async move { Ok(p.x * p.y) });
        let reply = handler.respond(json!({"x": 6, "y": 7})).await.unwrap();
        assert_eq!(reply, json!(42));
    }
}
