//! Channel router: multiplexes named channels over one [`EventTransport`].
//!
//! Outbound, [`Router::emit`] wraps `(channel, payload)` in an
//! [`Envelope`] and sends it as exactly one event. Inbound, every event
//! read by the dispatch loop goes through [`Router::dispatch`], which hands
//! the payload to the handler registered for the envelope's channel.
//! Messages that are not envelopes, or whose channel has no handler, are
//! dropped without error.
//!
//! ```ignore
//! let (local, _remote) = ChannelTransport::create_pair("ipc", ChannelConfig::default());
//! let router = Router::new(Arc::new(EventTransportAdapter::new(local)));
//!
//! router.on("response-channel", |text: String| println!("got {text}"));
//! let handle = router.start()?;
//!
//! router.emit("test-channel", &"Hello!").await?;
//! ```

pub mod config;
pub mod handler;
mod pending;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub use self::config::RouterConfig;
pub use self::handler::{Handler, RequestHandler, TypedHandler, TypedRequestHandler};

use self::handler::Route;
use self::pending::PendingRequests;
use crate::error::{Result, RouterError, TransportError};
use crate::message::Event;
use crate::message::envelope::Envelope;
use crate::message::types::{CONNECT_EVENT, DISCONNECT_EVENT, ResponseId, is_reserved};
use crate::transport::event::EventTransport;

/// Connection transitions reported to the lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected { reason: Option<String> },
}

type LifecycleHook = dyn Fn(&LifecycleEvent) + Send + Sync;

/// Which path an inbound event took through [`Router::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A channel handler received the payload.
    Delivered,
    /// A request handler ran and its reply was sent.
    Replied,
    /// The envelope answered one of our own `invoke` calls.
    Resolved,
    /// Well-formed envelope nobody listens to, or a reply nobody waits for.
    Unrouted,
    /// Not an envelope, or the payload did not fit the handler.
    Malformed,
    /// Connect or disconnect notification.
    Lifecycle,
    /// Some other event the router does not route.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub emitted: u64,
    pub delivered: u64,
    pub replied: u64,
    pub resolved: u64,
    pub unrouted: u64,
    pub malformed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    emitted: AtomicU64,
    delivered: AtomicU64,
    replied: AtomicU64,
    resolved: AtomicU64,
    unrouted: AtomicU64,
    malformed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RouterStats {
        RouterStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            replied: self.replied.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    config: RouterConfig,
    routes: RwLock<HashMap<String, Route>>,
    pending: PendingRequests,
    lifecycle: RwLock<Option<Arc<LifecycleHook>>>,
    counters: Counters,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Shared {
    fn notify_lifecycle(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::Connected => tracing::info!("transport connected"),
            LifecycleEvent::Disconnected { reason } => {
                tracing::info!(reason = reason.as_deref().unwrap_or("none"), "transport disconnected")
            }
        }

        let hook = self.lifecycle.read().clone();
        if let Some(hook) = hook {
            hook(&event);
        }
    }

    /// Tear down after the dispatch loop, however it ended. Runs once.
    fn finish(&self, reason: String) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pending.close();
        self.notify_lifecycle(LifecycleEvent::Disconnected {
            reason: Some(reason),
        });
        tracing::info!("router dispatch loop stopped");
    }
}

/// Routes `{channel, payload}` envelopes over a shared transport.
///
/// Cloning yields another handle to the same handler registry.
pub struct Router<T: EventTransport> {
    transport: Arc<T>,
    shared: Arc<Shared>,
}

impl<T: EventTransport> Clone for Router<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T: EventTransport + 'static> Router<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, RouterConfig::default())
    }

    pub fn with_config(transport: Arc<T>, config: RouterConfig) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                config,
                routes: RwLock::new(HashMap::new()),
                pending: PendingRequests::default(),
                lifecycle: RwLock::new(None),
                counters: Counters::default(),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Register `handler` for `channel`, replacing any earlier registration.
    ///
    /// Payloads that do not deserialize into `P` are dropped. Use
    /// [`serde_json::Value`] to receive payloads untouched.
    pub fn on<P, F>(&self, channel: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        self.register(channel, Arc::new(TypedHandler::new(handler)));
    }

    pub fn register(&self, channel: impl Into<String>, handler: Arc<dyn Handler>) {
        self.bind(channel.into(), Route::Listener(handler));
    }

    /// Answer `invoke` requests on `channel`.
    ///
    /// An `Err` from `handler` is sent back and surfaces as
    /// [`RouterError::Remote`] on the caller's side. Shares the channel
    /// namespace with [`on`](Self::on): the later registration wins.
    pub fn handle<Req, Resp, F, Fut>(&self, channel: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.register_responder(channel, Arc::new(TypedRequestHandler::new(handler)));
    }

    pub fn register_responder(&self, channel: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.bind(channel.into(), Route::Responder(handler));
    }

    /// Install the hook told about connects and disconnects.
    pub fn on_lifecycle<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        *self.shared.lifecycle.write() = Some(Arc::new(hook));
    }

    fn bind(&self, channel: String, route: Route) {
        if channel.is_empty() {
            tracing::warn!("ignoring handler registration for an empty channel name");
            return;
        }
        if self.shared.routes.write().insert(channel.clone(), route).is_some() {
            tracing::debug!(channel = %channel, "replaced channel handler");
        }
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        self.shared.routes.read().contains_key(channel)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.routes.read().len()
    }

    pub fn channels(&self) -> Vec<String> {
        self.shared.routes.read().keys().cloned().collect()
    }

    /// Send `payload` on `channel` as one envelope.
    ///
    /// Fire-and-forget: transport failures are returned as
    /// [`RouterError::Transport`] and nothing is retried or buffered.
    pub async fn emit<P: Serialize>(&self, channel: &str, payload: &P) -> Result<()> {
        validate_channel(channel)?;
        let event = Event::envelope(&self.shared.config.event_name, Envelope::new(channel, payload))?;
        self.transport.send(&event).await?;
        Counters::bump(&self.shared.counters.emitted);
        Ok(())
    }

    /// Send a request on `channel` and wait for the remote handler's reply.
    ///
    /// The reply is read by the dispatch loop, so a handler running on that
    /// loop must not await `invoke`; it would only time out.
    pub async fn invoke<Req, Resp>(&self, channel: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.invoke_with_timeout(channel, request, self.shared.config.invoke_timeout)
            .await
    }

    pub async fn invoke_with_timeout<Req, Resp>(
        &self,
        channel: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        validate_channel(channel)?;
        let id = ResponseId::new();
        let event = Event::envelope(
            &self.shared.config.event_name,
            Envelope::request(channel, request, &id),
        )?;

        let rx = self.shared.pending.register(id.clone())?;
        if let Err(e) = self.transport.send(&event).await {
            self.shared.pending.remove(&id);
            return Err(RouterError::Transport(e));
        }
        Counters::bump(&self.shared.counters.emitted);

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(RouterError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.remove(&id);
                return Err(RouterError::Timeout(format!(
                    "request {} on channel {:?} timed out after {:?}",
                    id, channel, timeout
                )));
            }
        };

        if let Some(error) = reply.error {
            return Err(RouterError::Remote(error));
        }
        Ok(serde_json::from_value(reply.payload)?)
    }

    /// Route one inbound event.
    ///
    /// Channel handlers run synchronously inside this call, so events
    /// dispatched in order reach their handlers in order.
    pub async fn dispatch(&self, event: Event) -> Dispatch {
        let Event { name, data } = event;

        if name == self.shared.config.event_name {
            return self.dispatch_envelope(data).await;
        }

        match name.as_str() {
            CONNECT_EVENT => {
                self.shared.notify_lifecycle(LifecycleEvent::Connected);
                Dispatch::Lifecycle
            }
            DISCONNECT_EVENT => {
                let reason = data.as_str().map(str::to_string);
                self.shared
                    .notify_lifecycle(LifecycleEvent::Disconnected { reason });
                Dispatch::Lifecycle
            }
            _ => self.dispatch_direct(&name, data),
        }
    }

    async fn dispatch_envelope(&self, data: Value) -> Dispatch {
        let counters = &self.shared.counters;

        let Some(envelope) = Envelope::parse(&data) else {
            tracing::debug!("dropping message without channel or payload");
            Counters::bump(&counters.malformed);
            return Dispatch::Malformed;
        };

        let id = envelope.response_id();
        if envelope.reply {
            let Some(id) = id else {
                tracing::debug!(channel = %envelope.channel, "dropping reply without a response id");
                Counters::bump(&counters.malformed);
                return Dispatch::Malformed;
            };
            // Replies only ever go to a waiting `invoke`, never to a handler.
            if let Some(late) = self.shared.pending.resolve(&id, envelope) {
                tracing::debug!(channel = %late.channel, response_id = %id, "dropping unmatched reply");
                Counters::bump(&counters.unrouted);
                return Dispatch::Unrouted;
            }
            Counters::bump(&counters.resolved);
            return Dispatch::Resolved;
        }

        let route = self.shared.routes.read().get(&envelope.channel).cloned();
        match route {
            None => {
                tracing::debug!(channel = %envelope.channel, "no handler for channel");
                Counters::bump(&counters.unrouted);
                Dispatch::Unrouted
            }
            Some(Route::Listener(handler)) => self.deliver(&envelope.channel, &handler, envelope.payload),
            Some(Route::Responder(handler)) => {
                let result = handler.respond(envelope.payload).await;
                match id {
                    Some(id) => self.reply(envelope.channel, &id, result).await,
                    None => {
                        // Sent with `emit`: nobody is waiting for the result.
                        if let Err(e) = result {
                            tracing::debug!(channel = %envelope.channel, error = %e, "request handler failed");
                        }
                        Counters::bump(&counters.delivered);
                        Dispatch::Delivered
                    }
                }
            }
        }
    }

    fn dispatch_direct(&self, name: &str, data: Value) -> Dispatch {
        if !self.shared.config.direct_events || is_reserved(name) {
            tracing::debug!(event = %name, "ignoring event");
            return Dispatch::Ignored;
        }

        let route = self.shared.routes.read().get(name).cloned();
        match route {
            Some(Route::Listener(handler)) => self.deliver(name, &handler, data),
            _ => {
                tracing::debug!(event = %name, "ignoring event");
                Dispatch::Ignored
            }
        }
    }

    fn deliver(&self, channel: &str, handler: &Arc<dyn Handler>, payload: Value) -> Dispatch {
        let counters = &self.shared.counters;
        match handler.handle(payload) {
            Ok(()) => {
                Counters::bump(&counters.delivered);
                Dispatch::Delivered
            }
            Err(e) => {
                tracing::debug!(channel = %channel, error = %e, "dropping payload the handler cannot decode");
                Counters::bump(&counters.malformed);
                Dispatch::Malformed
            }
        }
    }

    async fn reply(&self, channel: String, id: &ResponseId, result: Result<Value>) -> Dispatch {
        let reply = match result {
            Ok(payload) => Envelope::reply(channel, payload, id),
            Err(e) => Envelope::failure(channel, id, e.to_string()),
        };

        let sent = match Event::envelope(&self.shared.config.event_name, reply) {
            Ok(event) => self.transport.send(&event).await.map_err(RouterError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::warn!(response_id = %id, error = %e, "failed to send reply");
        }

        Counters::bump(&self.shared.counters.replied);
        Dispatch::Replied
    }

    /// Spawn the dispatch loop, the router's only reader of the transport.
    pub fn start(&self) -> Result<RouterHandle> {
        self.claim_transport()?;
        let router = self.clone();
        let handle = tokio::spawn(async move { router.run().await });
        Ok(RouterHandle {
            handle,
            shared: self.shared.clone(),
        })
    }

    /// Run the dispatch loop on the current task until the transport closes.
    pub async fn serve(&self) -> Result<()> {
        self.claim_transport()?;
        self.run().await
    }

    fn claim_transport(&self) -> Result<()> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(RouterError::AlreadyStarted);
        }
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        tracing::info!(event = %self.shared.config.event_name, "router dispatch loop started");
        if self.transport.is_connected() {
            self.shared.notify_lifecycle(LifecycleEvent::Connected);
        }

        let error = loop {
            match self.transport.recv().await {
                Ok(event) => {
                    self.dispatch(event).await;
                }
                Err(TransportError::Decode(reason)) => {
                    tracing::debug!(%reason, "dropping undecodable frame");
                    Counters::bump(&self.shared.counters.malformed);
                }
                Err(e) if !e.is_fatal() => {
                    tracing::debug!(error = %e, "transport receive interrupted");
                }
                Err(e) => break e,
            };
        };

        self.shared.finish(error.to_string());

        match error {
            TransportError::Closed => Ok(()),
            e => Err(RouterError::Transport(e)),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.shared.counters.snapshot()
    }

    /// Number of `invoke` calls still waiting for a reply.
    pub fn pending_invocations(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &RouterConfig {
        &self.shared.config
    }
}

impl<T: EventTransport> std::fmt::Debug for Router<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("transport", &self.transport)
            .field("config", &self.shared.config)
            .field("handlers", &self.shared.routes.read().len())
            .finish()
    }
}

fn validate_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(RouterError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

/// Handle to a dispatch loop spawned by [`Router::start`].
pub struct RouterHandle {
    handle: tokio::task::JoinHandle<Result<()>>,
    shared: Arc<Shared>,
}

impl RouterHandle {
    /// Stop the dispatch loop.
    ///
    /// Waiting and later `invoke` calls fail with
    /// [`RouterError::ConnectionClosed`] and the lifecycle hook sees
    /// `Disconnected`. The router cannot be started again.
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
        self.shared.finish("router shut down".to_string());
    }

    /// Wait for the loop to end on its own, i.e. until the transport closes.
    pub async fn join(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
