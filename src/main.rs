//! inspector-raspi MCP Server
//!
//! Stdio MCP server for Raspberry Pi diagnostics. stdout carries protocol
//! frames only; diagnostics go to stderr.

use anyhow::Context;
use clap::Parser;
use inspector_raspi::config::{ConfigOverrides, ServerConfig};
use inspector_raspi::mcp::{McpServer, StdioTransport};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// inspector-raspi MCP Server
#[derive(Parser, Debug)]
#[command(name = "inspector-raspi-mcp")]
#[command(version)]
#[command(about = "MCP stdio server exposing Raspberry Pi diagnostics")]
struct Args {
    /// Port of the inspector HTTP API on 127.0.0.1
    #[arg(short, long)]
    port: Option<u16>,

    /// HTTP request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Probe cache TTL in milliseconds
    #[arg(long)]
    cache_ttl_ms: Option<u64>,

    /// Wait up to this many milliseconds for the backend to report healthy
    #[arg(long)]
    wait_health_ms: Option<u64>,

    /// Write diagnostics to stderr
    #[arg(short, long)]
    debug: bool,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            timeout_ms: args.timeout_ms,
            cache_ttl_ms: args.cache_ttl_ms,
            wait_health_ms: args.wait_health_ms,
            debug: args.debug,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ServerConfig::from_env(args.into()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("inspector-raspi-mcp: {e}");
            return ExitCode::from(2);
        }
    };

    if config.debug {
        init_tracing();
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("inspector-raspi-mcp: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("inspector-raspi-mcp: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!(
        base_url = %config.base_url(),
        timeout_ms = config.timeout.as_millis() as u64,
        cache_ttl_ms = config.cache_ttl.as_millis() as u64,
        "inspector-raspi MCP server starting"
    );

    let mut server = McpServer::from_config(&config).context("failed to create HTTP client")?;

    if let Some(budget) = config.wait_health {
        server.dispatcher().backend().wait_until_healthy(budget).await;
    }

    let mut transport = StdioTransport::stdio();
    server
        .run(&mut transport)
        .await
        .context("stdio session failed")?;
    Ok(())
}
