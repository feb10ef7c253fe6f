//! Ultrathink MCP Server
//!
//! Persistent memory for AI agents over the Model Context Protocol:
//! hybrid lexical/semantic search, a typed knowledge graph, deduplicated
//! bulk ingestion, and grounded AI analysis, backed by SQLite with external
//! Ollama (embeddings, chat) and Qdrant (vectors) services.
//!
//! stdout carries JSON-RPC; all logging goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ultrathink_core::{Engine, UltrathinkConfig};

use ultrathink_mcp::http::HttpServer;
use ultrathink_mcp::protocol::stdio::StdioTransport;
use ultrathink_mcp::server::McpServer;

#[derive(Debug, Parser)]
#[command(name = "ultrathink-mcp", version, about = "Memory MCP server for AI agents")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Serve the HTTP API even if the config leaves it disabled
    #[arg(long)]
    http: bool,

    /// Skip the stdio JSON-RPC transport (HTTP only)
    #[arg(long)]
    no_stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => UltrathinkConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => UltrathinkConfig::load_default().context("loading default config")?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.database.path = Some(data_dir.join("ultrathink.db"));
    }
    if cli.http {
        config.rest_api.enabled = true;
    }

    // stdout is reserved for JSON-RPC
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Ultrathink MCP Server v{} starting", env!("CARGO_PKG_VERSION"));

    let engine = Arc::new(Engine::from_config(&config).context("initializing engine")?);
    engine.connect_services().await;
    info!("Engine initialized");

    if config.rest_api.enabled {
        let http = HttpServer {
            host: config.rest_api.host.clone(),
            port: config.rest_api.port,
            auto_port: config.rest_api.auto_port,
            cors: config.rest_api.cors,
            api_key: config.rest_api.api_key.clone(),
            allow_origins: config.rest_api.allow_origins.clone(),
        };
        let http_engine = Arc::clone(&engine);
        if cli.no_stdio {
            http.run(http_engine).await.context("HTTP server failed")?;
            return Ok(());
        }
        tokio::spawn(async move {
            if let Err(e) = http.run(http_engine).await {
                error!("HTTP server failed: {e}");
            }
        });
    } else if cli.no_stdio {
        anyhow::bail!("--no-stdio requires the HTTP API to be enabled");
    }

    let server = McpServer::new(engine);
    let transport = StdioTransport::new();
    info!("Serving JSON-RPC on stdio");
    transport.run(server).await.context("stdio transport failed")?;

    info!("Ultrathink MCP Server shutting down");
    Ok(())
}
