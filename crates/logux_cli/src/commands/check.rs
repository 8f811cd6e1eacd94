//! Check command implementation.

use logux_server::{BackendServer, ServerConfig};
use std::fs;
use std::path::Path;

/// Sends the body stored in `file` through the endpoint in-process and
/// prints the status line and body.
pub fn run(config: ServerConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let body = fs::read(file)?;
    let path = config.root_path.clone();
    let server = BackendServer::new(config, super::default_processor())?;

    let response = server.handle_post(&path, &body)?;
    println!("Status: {}", response.status().unwrap_or_default());
    println!("{}", response.body_text());
    Ok(())
}
