//! HTTP/SSE transport. `GET /sse` opens a new session and streams SSE
//! frames until the client disconnects; `POST /message?sessionId=...`
//! delivers one JSON-RPC message from the client.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_stream::stream;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::protocol::{self, RequestId, RpcError};
use crate::session::{FrameSink, HandlerTable, Session};
use crate::transport::Broadcaster;

/// Best-effort recovery of a malformed message's `id`, so a parse failure can
/// still be answered with a properly correlated JSON-RPC error frame instead
/// of being dropped silently. Only a top-level JSON object with a string or
/// integer `id` field counts as recoverable.
fn recover_id(body: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(body).ok()?;
    let id = value.as_object()?.get("id")?;
    if let Some(s) = id.as_str() {
        Some(RequestId::String(s.to_string()))
    } else {
        id.as_i64().map(RequestId::Number)
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

pub struct HttpTransport {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    handlers: OnceLock<Arc<HandlerTable>>,
    auth: AuthConfig,
}

impl HttpTransport {
    pub fn new(auth: AuthConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            handlers: OnceLock::new(),
            auth,
        })
    }

    /// Installs the server facade's handler table. Must be called before the
    /// router is served; sessions created before this call would otherwise
    /// have nothing to dispatch to.
    pub fn install_handlers(&self, handlers: Arc<HandlerTable>) {
        self.handlers
            .set(handlers)
            .unwrap_or_else(|_| panic!("handlers already installed"));
    }

    fn handlers(&self) -> Arc<HandlerTable> {
        self.handlers
            .get()
            .expect("HttpTransport::install_handlers must run before serving")
            .clone()
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/sse", get(sse_handler))
            .route("/message", post(message_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.clone())
    }

    fn check_auth(&self, headers: &HeaderMap) -> Option<StatusCode> {
        let Some(expected) = &self.auth.bearer_token else {
            return None;
        };
        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented == Some(expected.as_str()) {
            None
        } else {
            Some(StatusCode::UNAUTHORIZED)
        }
    }
}

#[async_trait]
impl Broadcaster for HttpTransport {
    async fn notify_all(&self, method: &str, params: Value) {
        let sessions: Vec<Arc<Session>> = self.sessions.lock().await.values().cloned().collect();
        for session in sessions {
            if let Err(e) = session.notify(method, params.clone()) {
                warn!(session = %session.id, error = %e, "broadcast failed for session, continuing");
            }
        }
    }
}

/// Removes and closes its session when the SSE stream generator that owns it
/// is dropped (client disconnect, server shutdown, or a fatal stream error).
struct SessionGuard {
    transport: Arc<HttpTransport>,
    session: Arc<Session>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let transport = self.transport.clone();
        let session = self.session.clone();
        tokio::spawn(async move {
            transport.sessions.lock().await.remove(&session.id);
            session.close().await;
            info!(session = %session.id, "session closed");
        });
    }
}

async fn sse_handler(
    State(transport): State<Arc<HttpTransport>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(status) = transport.check_auth(&headers) {
        return status.into_response();
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session = Session::new(FrameSink::new(tx), transport.handlers());
    let session_id = session.id.clone();
    transport
        .sessions
        .lock()
        .await
        .insert(session_id.clone(), session.clone());
    info!(session = %session_id, "session opened");

    let guard = SessionGuard {
        transport: transport.clone(),
        session: session.clone(),
    };

    let body = stream! {
        let _guard = guard;
        yield Ok::<Event, Infallible>(
            Event::default()
                .event("endpoint")
                .data(format!("/message?sessionId={session_id}")),
        );
        while let Some(frame) = rx.recv().await {
            yield Ok(Event::default().event("message").data(frame));
        }
    };

    Sse::new(body).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn message_handler(
    State(transport): State<Arc<HttpTransport>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    if let Some(status) = transport.check_auth(&headers) {
        return status;
    }

    let session = {
        let sessions = transport.sessions.lock().await;
        sessions.get(&query.session_id).cloned()
    };
    let Some(session) = session else {
        return StatusCode::NOT_FOUND;
    };

    let message = match protocol::decode(&body) {
        Ok(message) => message,
        Err(e) => {
            if let Some(id) = recover_id(&body) {
                let code = if serde_json::from_str::<Value>(&body).is_err() {
                    protocol::PARSE_ERROR
                } else {
                    protocol::INVALID_REQUEST
                };
                let _ = session.send_error_response(id, RpcError::new(code, e.to_string()));
            } else {
                warn!(session = %query.session_id, error = %e, "dropping malformed inbound message with no recoverable id");
            }
            return StatusCode::BAD_REQUEST;
        }
    };

    // Accept and return immediately; handler results are delivered later over
    // the SSE stream. Inbound dispatch is pipelined across messages.
    tokio::spawn(async move {
        session.handle_inbound(message).await;
    });

    StatusCode::OK
}

pub async fn serve(transport: Arc<HttpTransport>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = transport.router();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "mcp http/sse transport listening");
    axum::serve(listener, app).await?;
    Ok(())
}
