use std::net::SocketAddr;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_mcp::config::Cli;
use rust_mcp::pipeline::PipelineClient;
use rust_mcp::server::McpServerBuilder;
use rust_mcp::transport::http::{serve, HttpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let pipeline = PipelineClient::new(&cli.pipeline_config())?;
    let transport = HttpTransport::new(cli.auth_config());

    let server = McpServerBuilder::new(cli.server_name.clone(), cli.server_version.clone())
        .capabilities(cli.capabilities())
        .protocol_versions(cli.protocol_versions())
        .build(transport.clone(), pipeline);

    transport.install_handlers(server.handler_table());

    let addr: SocketAddr = cli.listen_addr.parse()?;
    info!(server = %cli.server_name, %addr, "starting mcp pipeline server");
    serve(transport, addr).await
}
