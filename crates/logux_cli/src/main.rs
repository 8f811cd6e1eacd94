//! Logux back-end server CLI
//!
//! Command-line runner for the Logux back-end endpoint.
//!
//! # Commands
//!
//! - `serve` - Serve the back-end endpoint over HTTP
//! - `check` - Run a request body through the endpoint and print the response
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use logux_protocol::DEFAULT_PROTOCOL_VERSION;
use logux_server::{ServerConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_ROOT_PATH};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Logux back-end server.
#[derive(Parser)]
#[command(name = "logux-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shared secret expected from the Logux proxy
    #[arg(global = true, short, long, env = "LOGUX_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Path the endpoint answers on
    #[arg(global = true, long, default_value = DEFAULT_ROOT_PATH)]
    path: String,

    /// Lowest accepted back-end protocol version
    #[arg(global = true, long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    min_version: u32,

    /// Highest accepted back-end protocol version
    #[arg(global = true, long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    max_version: u32,

    /// Maximum request body size in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the back-end endpoint over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:31338")]
        bind: SocketAddr,
    },

    /// Run a request body through the endpoint and print the response
    Check {
        /// File holding the JSON request body
        file: PathBuf,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let secret = self
            .secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or("Secret required (--secret or LOGUX_SECRET)")?;
        if self.min_version > self.max_version {
            return Err(format!(
                "--min-version {} is greater than --max-version {}",
                self.min_version, self.max_version
            )
            .into());
        }

        Ok(ServerConfig::new(secret)
            .with_root_path(self.path.clone())
            .with_supported_versions(self.min_version..=self.max_version)
            .with_max_body_size(self.max_body_size))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Serve { bind } => {
            let config = cli.server_config()?.with_bind_addr(*bind);
            commands::serve::run(config).await?;
        }
        Commands::Check { file } => {
            commands::check::run(cli.server_config()?, file)?;
        }
        Commands::Version => {
            println!("Logux back-end server v{}", env!("CARGO_PKG_VERSION"));
            println!("Back-end protocol v{DEFAULT_PROTOCOL_VERSION}");
        }
    }

    Ok(())
}
