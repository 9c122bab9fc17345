#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Main entry point for the Palaver backend CLI.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::Config;

/// Command-line interface of the Palaver server binary.
#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "Backend server for the Palaver messaging platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the messaging API, web UI and push relay
    Serve {
        /// Port to bind, overriding the configured one.
        #[arg(long, short)]
        port: Option<u16>,

        /// Configuration file (YAML or JSON); defaults apply when absent.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// Resolves configuration (file, then `PALAVER_*` environment, then the
/// CLI port) and runs the server until shutdown.
async fn serve(port: Option<u16>, config: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let resolved = Config::load_config(config, port)?;
    server::server::run(resolved).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    match Cli::parse().command {
        Commands::Serve { port, config } => serve(port, config).await,
    }
}
