//! Per-client session: the JSON-RPC correlation table for outstanding
//! server-to-client requests, the ordered send queue to the SSE stream, and
//! the lifecycle state machine. One `Session` exists per connected client;
//! it is created when the SSE stream opens and destroyed when it closes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::warn;
use uuid::Uuid;

use crate::protocol::{self, CodecError, Message, Notification, Request, RequestId, Response, RpcError};
use crate::types::{ClientCapabilities, Implementation, ListRootsResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type RequestHandler =
    Arc<dyn Fn(Exchange, Option<Value>) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;
pub type NotificationHandler =
    Arc<dyn Fn(Exchange, Option<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Method/notification dispatch table, owned by the server facade and
/// shared read-only across every session.
#[derive(Default, Clone)]
pub struct HandlerTable {
    pub requests: HashMap<String, RequestHandler>,
    pub notifications: HashMap<String, NotificationHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("malformed wire message: {0}")]
    Codec(#[from] CodecError),
    #[error("server not initialized")]
    NotInitialized,
    #[error("remote error {0:?}")]
    Remote(RpcError),
}

/// Outbound frame sink. Wraps a single unbounded channel so every frame
/// produced by a session is serialized FIFO onto it, regardless of how many
/// concurrent handlers are in flight.
#[derive(Clone)]
pub struct FrameSink(mpsc::UnboundedSender<String>);

impl FrameSink {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self(sender)
    }

    fn send(&self, frame: String) -> Result<(), SessionError> {
        self.0.send(frame).map_err(|_| SessionError::Closed)
    }
}

struct PendingRequest {
    completion: oneshot::Sender<Result<Value, RpcError>>,
}

pub struct Session {
    pub id: String,
    sink: FrameSink,
    correlation: Mutex<HashMap<RequestId, PendingRequest>>,
    state: RwLock<LifecycleState>,
    client_info: RwLock<Option<Implementation>>,
    client_capabilities: RwLock<Option<ClientCapabilities>>,
    handlers: Arc<HandlerTable>,
}

impl Session {
    pub fn new(sink: FrameSink, handlers: Arc<HandlerTable>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            sink,
            correlation: Mutex::new(HashMap::new()),
            state: RwLock::new(LifecycleState::Created),
            client_info: RwLock::new(None),
            client_capabilities: RwLock::new(None),
            handlers,
        })
    }

    pub async fn lifecycle(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn set_initialized(&self, info: Implementation, capabilities: ClientCapabilities) {
        *self.client_info.write().await = Some(info);
        *self.client_capabilities.write().await = Some(capabilities);
        *self.state.write().await = LifecycleState::Initialized;
    }

    pub async fn client_info(&self) -> Option<Implementation> {
        self.client_info.read().await.clone()
    }

    fn send_frame(&self, message: &Message) -> Result<(), SessionError> {
        let text = protocol::encode(message)?;
        self.sink.send(text)
    }

    /// Sends a bare error Response frame for an inbound message the codec
    /// could not parse into a `Message` at all, but whose `id` the transport
    /// managed to recover structurally. Used for malformed-message recovery
    /// where no `Request` was ever decoded to route normally.
    pub fn send_error_response(&self, id: RequestId, error: RpcError) -> Result<(), SessionError> {
        self.send_frame(&Message::Response(Response::error(id, error)))
    }

    /// Route one inbound message. Requests produce exactly one Response
    /// frame; Notifications never reply; stale/duplicate Responses are
    /// dropped with a warning.
    pub async fn handle_inbound(self: &Arc<Self>, message: Message) {
        match message {
            Message::Request(request) => self.handle_request(request).await,
            Message::Notification(notification) => self.handle_notification(notification).await,
            Message::Response(response) => self.complete_pending(response).await,
        }
    }

    async fn handle_request(self: &Arc<Self>, request: Request) {
        if *self.state.read().await == LifecycleState::Closed {
            return;
        }

        let id = request.id.clone();
        let allowed_before_init = matches!(request.method.as_str(), "initialize" | "ping");
        if *self.state.read().await != LifecycleState::Initialized && !allowed_before_init {
            let error = RpcError::new(protocol::INVALID_REQUEST, "Server not initialized");
            let _ = self.send_frame(&Message::Response(Response::error(id, error)));
            return;
        }

        let Some(handler) = self.handlers.requests.get(&request.method).cloned() else {
            let error = RpcError::method_not_found(&request.method);
            let _ = self.send_frame(&Message::Response(Response::error(id, error)));
            return;
        };

        let exchange = Exchange::new(self);
        let response = match handler(exchange, request.params).await {
            Ok(result) => Response::success(id, result),
            Err(rpc_error) => Response::error(id, rpc_error),
        };
        let _ = self.send_frame(&Message::Response(response));
    }

    async fn handle_notification(self: &Arc<Self>, notification: Notification) {
        if *self.state.read().await == LifecycleState::Closed {
            return;
        }
        if let Some(handler) = self.handlers.notifications.get(&notification.method).cloned() {
            let exchange = Exchange::new(self);
            handler(exchange, notification.params).await;
        }
    }

    async fn complete_pending(&self, response: Response) {
        let mut table = self.correlation.lock().await;
        match table.remove(&response.id) {
            Some(pending) => {
                let result = match (response.result, response.error) {
                    (Some(value), None) => Ok(value),
                    (None, Some(error)) => Err(error),
                    _ => Err(RpcError::internal_error("malformed response envelope")),
                };
                let _ = pending.completion.send(result);
            }
            None => {
                warn!(session = %self.id, id = %response.id, "dropping stale or duplicate response");
            }
        }
    }

    /// Issue a server-to-client request and await its response. Allocates a
    /// fresh UUID request id, inserts a correlation entry, and enqueues the
    /// encoded Request frame.
    pub async fn send_request(
        self: &Arc<Self>,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        if *self.state.read().await == LifecycleState::Closed {
            return Err(SessionError::Closed);
        }

        let id = RequestId::String(Uuid::new_v4().to_string());
        let (tx, rx) = oneshot::channel();
        self.correlation
            .lock()
            .await
            .insert(id.clone(), PendingRequest { completion: tx });

        let request = Request {
            jsonrpc: protocol::JSONRPC_VERSION.to_string(),
            id: id.clone(),
            method: method.to_string(),
            params: Some(params),
        };
        if let Err(e) = self.send_frame(&Message::Request(request)) {
            self.correlation.lock().await.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(rpc_error)) => Err(SessionError::Remote(rpc_error)),
            Err(_) => Err(SessionError::Closed),
        }
    }

    /// Broadcast a Notification frame (used for e.g.
    /// `notifications/tools/list_changed`). Best-effort: failures are
    /// reported to the caller so the transport can log and move on.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        let notification = Notification {
            jsonrpc: protocol::JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: Some(params),
        };
        self.send_frame(&Message::Notification(notification))
    }

    /// Close the session: fail every pending outbound-request future with
    /// `SessionError::Closed` and stop accepting further inbound frames.
    pub async fn close(&self) {
        *self.state.write().await = LifecycleState::Closed;
        let mut table = self.correlation.lock().await;
        for (_, pending) in table.drain() {
            let _ = pending
                .completion
                .send(Err(RpcError::internal_error("session closed")));
        }
    }
}

/// A narrow capability handed to each handler invocation so it can issue
/// server-to-client requests without knowing about the session type. Holds
/// no mutable state of its own, is a capability handle rather than an
/// identity, and never outlives the handler call that created it.
#[derive(Clone)]
pub struct Exchange {
    session: Weak<Session>,
}

impl Exchange {
    pub(crate) fn new(session: &Arc<Session>) -> Self {
        Self {
            session: Arc::downgrade(session),
        }
    }

    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    pub async fn list_roots(&self, cursor: Option<String>) -> Result<ListRootsResult, SessionError> {
        let session = self.session.upgrade().ok_or(SessionError::Closed)?;
        let value = session
            .send_request("roots/list", serde_json::json!({ "cursor": cursor }))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| SessionError::Codec(CodecError::Malformed(e.to_string())))
    }
}
