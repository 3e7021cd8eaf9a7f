//! # mcp-jellyseerr
//!
//! MCP (Model Context Protocol) server that exposes a Jellyseerr instance as
//! a set of tools. Runs as a stdio JSON-RPC server, designed to be launched
//! by an AI agent host.
//!
//! ## Architecture
//!
//! ```text
//! main.rs      — entry point, config loading, logging, MCP server launch
//! config.rs    — JSON file / env-var configuration loading
//! client.rs    — HTTP client for the Jellyseerr REST API, error taxonomy
//! resolver.rs  — service/season resolution and request creation
//! mcp.rs       — MCP JSON-RPC protocol handler (stdio)
//! tools.rs     — tool definitions and handlers
//! ```
//!
//! ## Tools
//!
//! `ping`, `search_media`, `request_media`, `get_request`, `raw_request`

mod client;
mod config;
mod mcp;
mod resolver;
mod tools;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::JellyseerrClient;
use config::Cli;
use resolver::RequestResolver;
use tools::{ServerInfo, ToolContext};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let resolved = match config::load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("mcp-jellyseerr: configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // stdout carries the protocol; logs go to stderr.
    let log_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&resolved.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let client = Arc::new(JellyseerrClient::new(
        &resolved.url,
        resolved.api_key.clone(),
        resolved.timeout,
    ));
    info!(
        "mcp-jellyseerr v{} starting, api={}, transport={}",
        env!("CARGO_PKG_VERSION"),
        client.base_url(),
        resolved.transport
    );
    let ctx = ToolContext {
        resolver: RequestResolver::new(client.clone(), resolved.services.clone()),
        info: ServerInfo {
            transport: resolved.transport.clone(),
            auth_enabled: false,
        },
    };

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = mcp::run_stdio(&ctx) => info!("stdin closed, shutting down"),
        () = interrupted => info!("interrupted, shutting down"),
    }

    client.close();
}
