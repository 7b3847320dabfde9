//! Transport provider: owns the HTTP endpoints, the registry of live
//! sessions keyed by opaque session id, and the session factory.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

/// What the server facade needs from a transport: the ability to push a
/// notification to every currently registered session. Broadcast delivery
/// is best-effort, a failure on one session never aborts the others.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn notify_all(&self, method: &str, params: Value);
}
