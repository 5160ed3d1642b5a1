//! Tether - MCP server with Redis-backed session storage.
//!
//! Main entry point for the Tether CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::server;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tether - MCP (Model Context Protocol) server implementation
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the MCP HTTP server with Redis session storage
    Server(server::ServerArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) plus a daily rotating JSON file
    let filter = if cli.verbose {
        "tether=debug,tether_server=debug,tether_session=debug,tower_http=debug,info"
    } else {
        "tether=info,tether_server=info,tether_session=info,warn"
    };

    let log_dir = dirs::data_local_dir()
        .map(|d| d.join("tether").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tether.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "tether=trace,tether_server=trace,tether_session=trace,info",
                )),
        )
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Server(args) => server::run(args).await,
    }
}
