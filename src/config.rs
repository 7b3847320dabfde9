//! Configuration surface: server identity, listen address, upstream pipeline
//! coordinates, declared capabilities and supported protocol versions.

use clap::Parser;

use crate::pipeline::PipelineConfig;
use crate::server::Capabilities;
use crate::transport::http::AuthConfig;

#[derive(Debug, Parser)]
#[command(name = "mcp-pipeline-server", version, about = "MCP server fronting an upstream tool pipeline")]
pub struct Cli {
    /// Name reported in `serverInfo.name` during the initialize handshake.
    #[arg(long, env = "MCP_SERVER_NAME", default_value = "custom-server")]
    pub server_name: String,

    /// Version reported in `serverInfo.version`.
    #[arg(long, env = "MCP_SERVER_VERSION", default_value = "0.0.1")]
    pub server_version: String,

    /// Address the HTTP/SSE transport listens on.
    #[arg(long, env = "MCP_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Upstream pipeline URL that resolves `tools/list` and `tools/call`.
    #[arg(long, env = "MCP_PIPELINE_URL")]
    pub pipeline_url: String,

    /// Bearer token presented to the upstream pipeline.
    #[arg(long, env = "MCP_PIPELINE_TOKEN")]
    pub pipeline_token: String,

    /// Upstream pipeline request timeout in milliseconds.
    #[arg(long, env = "MCP_PIPELINE_TIMEOUT_MS", default_value_t = 30_000)]
    pub pipeline_timeout_ms: u64,

    /// Comma-separated supported protocol versions, ordered ascending.
    #[arg(long, env = "MCP_PROTOCOL_VERSIONS", default_value = "2024-11-05")]
    pub protocol_versions: String,

    /// Declare `tools.listChanged` capability and broadcast
    /// `notifications/tools/list_changed` on `addTool`.
    #[arg(long, env = "MCP_TOOLS_LIST_CHANGED", default_value_t = true)]
    pub tools_list_changed: bool,

    /// Declare the `logging` capability and accept `logging/setLevel`.
    #[arg(long, env = "MCP_LOGGING_CAPABILITY", default_value_t = true)]
    pub logging_capability: bool,

    /// Require `Authorization: Bearer <token>` on inbound MCP client
    /// requests. Unset by default: the transport is assumed trusted or
    /// fronted by a separate auth layer.
    #[arg(long, env = "MCP_INBOUND_BEARER_TOKEN")]
    pub inbound_bearer_token: Option<String>,
}

impl Cli {
    pub fn protocol_versions(&self) -> Vec<String> {
        self.protocol_versions
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            url: self.pipeline_url.clone(),
            bearer_token: self.pipeline_token.clone(),
            timeout_ms: self.pipeline_timeout_ms,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            tools_list_changed: self.tools_list_changed,
            logging: self.logging_capability,
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            bearer_token: self.inbound_bearer_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_protocol_versions() {
        let cli = Cli::parse_from([
            "mcp-pipeline-server",
            "--pipeline-url",
            "http://localhost/pipeline",
            "--pipeline-token",
            "t",
            "--protocol-versions",
            "2024-11-05, 2025-01-01",
        ]);
        assert_eq!(
            cli.protocol_versions(),
            vec!["2024-11-05".to_string(), "2025-01-01".to_string()]
        );
    }
}
