//! Server facade: declared capabilities, tool registry, and the built-in
//! method/notification handlers (`ping`, `tools/list`, `tools/call`,
//! `logging/setLevel`, `initialize`, `notifications/initialized`).

pub mod tools_schema;

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::pipeline::{PipelineClient, PipelineError};
use crate::protocol::{self, RpcError};
use crate::session::{BoxFuture, Exchange, HandlerTable};
use crate::transport::Broadcaster;
use crate::types::{
    CallToolResult, ClientCapabilities, Content, Implementation, LoggingLevel,
    ServerCapabilities, Tool, ToolsCapability,
};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
}

/// Copy-on-write tool registry: reads are lock-free `ArcSwap` snapshots,
/// writes clone-and-swap under no lock held across an `.await`.
pub struct ToolRegistry {
    tools: ArcSwap<Vec<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Tool>> {
        self.tools.load_full()
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.load().iter().find(|t| t.name == name).cloned()
    }

    /// Replaces the whole registry, e.g. after a `tools/list` refresh from
    /// the upstream pipeline.
    pub fn replace(&self, tools: Vec<Tool>) {
        self.tools.store(Arc::new(tools));
    }

    /// Rejects a duplicate name; on failure the prior registration is left
    /// unchanged and no list-changed notification should be emitted.
    pub fn add(&self, tool: Tool) -> Result<(), ServerError> {
        let current = self.tools.load_full();
        if current.iter().any(|t| t.name == tool.name) {
            return Err(ServerError::DuplicateTool(tool.name));
        }
        let mut updated = (*current).clone();
        updated.push(tool);
        self.tools.store(Arc::new(updated));
        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Capabilities {
    pub tools_list_changed: bool,
    pub logging: bool,
}

pub struct McpServer {
    pub name: String,
    pub version: String,
    capabilities: Capabilities,
    /// Ordered ascending; the last entry is the highest supported version.
    protocol_versions: Vec<String>,
    pub registry: ToolRegistry,
    pipeline: PipelineClient,
    min_log_level: RwLock<LoggingLevel>,
    broadcaster: Arc<dyn Broadcaster>,
}

pub struct McpServerBuilder {
    name: String,
    version: String,
    capabilities: Capabilities,
    protocol_versions: Vec<String>,
}

impl McpServerBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            capabilities: Capabilities {
                tools_list_changed: true,
                logging: true,
            },
            protocol_versions: vec!["2024-11-05".to_string()],
        }
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn protocol_versions(mut self, versions: Vec<String>) -> Self {
        self.protocol_versions = versions;
        self
    }

    pub fn build(self, broadcaster: Arc<dyn Broadcaster>, pipeline: PipelineClient) -> Arc<McpServer> {
        Arc::new(McpServer {
            name: self.name,
            version: self.version,
            capabilities: self.capabilities,
            protocol_versions: self.protocol_versions,
            registry: ToolRegistry::new(),
            pipeline,
            min_log_level: RwLock::new(LoggingLevel::Info),
            broadcaster,
        })
    }
}

impl McpServer {
    fn capabilities_json(&self) -> Value {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: self.capabilities.tools_list_changed,
            }),
            logging: self.capabilities.logging.then(|| json!({})),
        };
        serde_json::to_value(caps).unwrap_or(json!({}))
    }

    fn negotiate_protocol_version(&self, requested: &str) -> String {
        if self.protocol_versions.iter().any(|v| v == requested) {
            requested.to_string()
        } else {
            self.protocol_versions
                .last()
                .cloned()
                .unwrap_or_else(|| requested.to_string())
        }
    }

    async fn refresh_from_pipeline(&self, params: Value) -> Result<(), PipelineError> {
        let defs = self.pipeline.list_tools(params).await?;
        let tools = defs.into_iter().map(tools_schema::convert).collect();
        self.registry.replace(tools);
        Ok(())
    }

    /// Appends a tool to the registry; broadcasts
    /// `notifications/tools/list_changed` to every session only if the
    /// write succeeded and the capability was declared at build time.
    pub async fn add_tool(self: &Arc<Self>, tool: Tool) -> Result<(), ServerError> {
        self.registry.add(tool)?;
        if self.capabilities.tools_list_changed {
            self.broadcaster
                .notify_all("notifications/tools/list_changed", json!({}))
                .await;
        }
        Ok(())
    }

    pub async fn min_log_level(&self) -> LoggingLevel {
        *self.min_log_level.read().await
    }

    /// Builds the request/notification handler table this server installs:
    /// `ping`, `initialize`, `tools/list`, `tools/call`, `logging/setLevel`,
    /// and `notifications/initialized`.
    pub fn handler_table(self: &Arc<Self>) -> Arc<HandlerTable> {
        let mut table = HandlerTable::new();

        table.requests.insert(
            "ping".to_string(),
            Arc::new(|_exchange, _params| -> BoxFuture<'static, Result<Value, RpcError>> {
                Box::pin(async { Ok(json!({})) })
            }),
        );

        {
            let server = self.clone();
            table.requests.insert(
                "initialize".to_string(),
                Arc::new(move |exchange: Exchange, params: Option<Value>| {
                    let server = server.clone();
                    Box::pin(async move { initialize(server, exchange, params).await })
                        as BoxFuture<'static, Result<Value, RpcError>>
                }),
            );
        }

        {
            let server = self.clone();
            table.requests.insert(
                "tools/list".to_string(),
                Arc::new(move |_exchange, params: Option<Value>| {
                    let server = server.clone();
                    Box::pin(async move { tools_list(server, params).await })
                        as BoxFuture<'static, Result<Value, RpcError>>
                }),
            );
        }

        {
            let server = self.clone();
            table.requests.insert(
                "tools/call".to_string(),
                Arc::new(move |_exchange, params: Option<Value>| {
                    let server = server.clone();
                    Box::pin(async move { tools_call(server, params).await })
                        as BoxFuture<'static, Result<Value, RpcError>>
                }),
            );
        }

        {
            let server = self.clone();
            table.requests.insert(
                "logging/setLevel".to_string(),
                Arc::new(move |_exchange, params: Option<Value>| {
                    let server = server.clone();
                    Box::pin(async move { logging_set_level(server, params).await })
                        as BoxFuture<'static, Result<Value, RpcError>>
                }),
            );
        }

        table.notifications.insert(
            "notifications/initialized".to_string(),
            Arc::new(|_exchange, _params| Box::pin(async {})),
        );

        Arc::new(table)
    }
}

async fn initialize(
    server: Arc<McpServer>,
    exchange: Exchange,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params = params.unwrap_or_else(|| json!({}));
    let requested = params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let negotiated = server.negotiate_protocol_version(requested);

    let client_info: Implementation = params
        .get("clientInfo")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(Implementation {
            name: "unknown".to_string(),
            version: "0".to_string(),
        });
    let client_capabilities: ClientCapabilities = params
        .get("capabilities")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    if let Some(session) = exchange.session() {
        session
            .set_initialized(client_info.clone(), client_capabilities)
            .await;
    }

    debug!(client = %client_info.name, version = %negotiated, "session initialized");

    Ok(json!({
        "protocolVersion": negotiated,
        "capabilities": server.capabilities_json(),
        "serverInfo": { "name": server.name, "version": server.version },
    }))
}

async fn tools_list(server: Arc<McpServer>, params: Option<Value>) -> Result<Value, RpcError> {
    let params = params.unwrap_or_else(|| json!({}));
    if let Err(e) = server.refresh_from_pipeline(params).await {
        error!(error = %e, "tools/list upstream failure");
        return Err(RpcError::internal_error(format!(
            "upstream pipeline failure: {e}"
        )));
    }
    let tools = server.registry.snapshot();
    let tools_json: Vec<Value> = tools
        .iter()
        .map(|t| serde_json::to_value(t).unwrap_or(json!({})))
        .collect();
    Ok(json!({ "tools": tools_json, "nextCursor": Value::Null }))
}

async fn tools_call(server: Arc<McpServer>, params: Option<Value>) -> Result<Value, RpcError> {
    let params =
        params.ok_or_else(|| RpcError::new(protocol::INVALID_REQUEST, "tools/call missing params"))?;
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::new(protocol::INVALID_REQUEST, "tools/call missing 'name'"))?
        .to_string();
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match server.pipeline.call_tool(&name, arguments).await {
        Ok(value) => {
            let text = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
            let result = CallToolResult::new(vec![Content::text(text)])
                .map_err(RpcError::internal_error)?;
            Ok(serde_json::to_value(result).unwrap_or(json!({})))
        }
        Err(e) => {
            error!(tool = %name, error = %e, "upstream pipeline call failed");
            Err(RpcError::internal_error(format!(
                "upstream pipeline failure: {e}"
            )))
        }
    }
}

async fn logging_set_level(server: Arc<McpServer>, params: Option<Value>) -> Result<Value, RpcError> {
    let params = params
        .ok_or_else(|| RpcError::new(protocol::INVALID_REQUEST, "logging/setLevel missing params"))?;
    let level_value = params
        .get("level")
        .cloned()
        .ok_or_else(|| RpcError::new(protocol::INVALID_REQUEST, "logging/setLevel missing 'level'"))?;
    let level: LoggingLevel = serde_json::from_value(level_value)
        .map_err(|e| RpcError::new(protocol::INVALID_REQUEST, e.to_string()))?;

    *server.min_log_level.write().await = level;
    Ok(json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullBroadcaster {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Broadcaster for NullBroadcaster {
        async fn notify_all(&self, _method: &str, _params: Value) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn server_for_test() -> Arc<McpServer> {
        let pipeline = PipelineClient::new(&PipelineConfig {
            url: "http://127.0.0.1:9".to_string(),
            bearer_token: "t".to_string(),
            timeout_ms: 1000,
        })
        .unwrap();
        McpServerBuilder::new("custom-server", "0.0.1").build(
            Arc::new(NullBroadcaster {
                calls: AtomicUsize::new(0),
            }),
            pipeline,
        )
    }

    #[test]
    fn negotiates_supported_version_by_echo() {
        let server = server_for_test();
        assert_eq!(server.negotiate_protocol_version("2024-11-05"), "2024-11-05");
    }

    #[test]
    fn negotiates_highest_when_unsupported() {
        let server = server_for_test();
        assert_eq!(server.negotiate_protocol_version("1999-01-01"), "2024-11-05");
    }

    #[tokio::test]
    async fn add_tool_rejects_duplicate_without_mutating_registry() {
        let server = server_for_test();
        let tool = Tool {
            name: "echo".to_string(),
            description: "e".to_string(),
            input_schema: crate::types::InputSchema {
                schema_type: "object".to_string(),
                properties: Default::default(),
                required: vec![],
                additional_properties: false,
            },
        };
        server.add_tool(tool.clone()).await.unwrap();
        assert_eq!(server.registry.snapshot().len(), 1);

        let err = server.add_tool(tool).await.unwrap_err();
        assert!(matches!(err, ServerError::DuplicateTool(name) if name == "echo"));
        assert_eq!(server.registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn ping_handler_returns_empty_object() {
        let server = server_for_test();
        let table = server.handler_table();
        let handler = table.requests.get("ping").unwrap().clone();
        let exchange_session = crate::session::Session::new(
            crate::session::FrameSink::new(tokio::sync::mpsc::unbounded_channel().0),
            table.clone(),
        );
        let exchange = crate::session::Exchange::new(&exchange_session);
        let result = handler(exchange, None).await.unwrap();
        assert_eq!(result, json!({}));
    }
}
