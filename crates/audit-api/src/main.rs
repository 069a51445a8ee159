//! Audit API server entry point
//!
//! Run with:
//! ```bash
//! cargo run -p audit-api --bin audit-api
//! ```
//!
//! Configuration is loaded from environment variables or a `.env` file.

use audit_common::{try_init_tracing, AppConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {}", e);
    }

    // Run the server
    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting audit API server...");

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        env = ?config.app.env,
        port = config.api.port,
        store = if config.database.is_some() { "postgres" } else { "memory" },
        "Configuration loaded"
    );

    audit_api::run(config).await?;

    Ok(())
}
