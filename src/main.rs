//! # Signal Gateway
//!
//! Real-time distribution and call signaling service.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database connection pool and migrations
//! - Redis client
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use signal_gateway::config::Settings;
use signal_gateway::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    signal_gateway::telemetry::init_tracing();

    info!("Starting Signal Gateway...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
