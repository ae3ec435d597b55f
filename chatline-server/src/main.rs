#![cfg_attr(not(test), forbid(unsafe_code))]

//! Main entry point for the Chatline server CLI.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;

/// Main CLI structure for the Chatline server
#[derive(Debug, Parser)]
#[command(name = "chatline-server")]
#[command(about = "Real-time chat fan-out server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP and push-channel server
    Serve {
        /// Port to bind; overrides the config file and `CHATLINE_SERVER_PORT`
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to a YAML, JSON or TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// Resolves configuration and runs the server until shutdown.
///
/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(port: Option<u16>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved = Config::load_config(config, port).context("failed to load configuration")?;
    server::server::run(resolved).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
    }
}
