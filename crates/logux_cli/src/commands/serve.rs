//! Serve command implementation.

use logux_server::{BackendServer, ServerConfig};

/// Runs the HTTP endpoint until the listener fails.
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let server = BackendServer::new(config, super::default_processor())?;
    server.run().await?;
    Ok(())
}
