//! ferry-server: serve a directory to ferry clients

use ferry::{logging, Server, ServerConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Initialize logging
    logging::init(&config.log_level, &config.log_file)?;

    info!(
        listen = %config.listen,
        root = %config.root.display(),
        max_connections = config.max_connections,
        "Starting ferry server"
    );

    let server = Server::bind(config).await.map_err(|e| {
        error!(error = %e, "Can't start server");
        e
    })?;
    server.run().await?;

    info!("Server closed");
    Ok(())
}
