//! # Courier Gateway
//!
//! Realtime delivery core for the product: authenticated WebSocket
//! sessions, per-user and per-conversation rooms, multi-device presence,
//! and relay of messages, typing activity, read receipts, and
//! notifications.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! courier
//!
//! # Run with custom config
//! courier  # reads courier.toml from the working directory
//!
//! # Run with environment variables
//! COURIER_PORT=8080 COURIER_HOST=0.0.0.0 courier
//! ```

mod auth;
mod config;
mod messages;
mod metrics;
mod notifications;
mod receipts;
mod routes;
mod session;
mod state;
mod typing;

use anyhow::Result;
use courier_store::MemoryStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_gateway=debug,courier_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Courier gateway on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Collaborator clients are wired by the embedding deployment; the
    // standalone binary runs against the in-memory store.
    let store = Arc::new(MemoryStore::new());

    // Start the server
    routes::run_server(config, store.clone(), store).await?;

    Ok(())
}
