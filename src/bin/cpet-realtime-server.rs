// ABOUTME: Server binary for live anaerobic threshold detection over WebSockets
// ABOUTME: Loads env configuration, wires stores and the rule-based scorer, serves until Ctrl+C
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # CPET Realtime Server Binary
//!
//! Starts the HTTP and WebSocket server. The scoring function injected here
//! is the deterministic rule-based scorer.

use anyhow::{Context, Result};
use clap::Parser;
use cpet_detection::RuleBasedScorer;
use cpet_realtime_server::{
    config::ServerConfig, logging, resources::ServerResources, routes::build_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "cpet-realtime-server")]
#[command(about = "CPET realtime server - live anaerobic threshold detection and exam replay")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    info!("Starting CPET realtime server");
    info!("{}", config.summary());

    let config = Arc::new(config);
    let resources = Arc::new(
        ServerResources::from_config(Arc::clone(&config), Arc::new(RuleBasedScorer))
            .await
            .context("Failed to initialize server resources")?,
    );
    let router = build_router(&resources);

    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    display_available_endpoints(&config);

    let sessions = Arc::clone(&resources.sessions);
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    sessions.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

/// Log the endpoints served on the configured port
fn display_available_endpoints(config: &ServerConfig) {
    let port = config.http_port;
    info!("=== Available Endpoints ===");
    info!("Health:        GET  http://localhost:{port}/health");
    info!("Sessions:      POST http://localhost:{port}/api/sessions");
    info!("               GET  http://localhost:{port}/api/sessions/{{session_id}}");
    info!("Realtime:      WS   ws://localhost:{port}/api/ws/realtime/{{session_id}}");
    info!("Annotations:   POST http://localhost:{port}/api/exams/{{exam_id}}/annotations");
    info!("Consensus:     GET  http://localhost:{port}/api/exams/{{exam_id}}/consensus");
    info!("=== End of Endpoint List ===");
}
