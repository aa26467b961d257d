// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Concord CLI
//!
//! The `concord` binary runs the coordination service and drives a running
//! instance for inspection and administration.
//!
//! ## Commands
//!
//! - `concord serve` - run the HTTP API plus the periodic stale-lock sweeper
//! - `concord status check|post` - agent-side coordination calls
//! - `concord graph get` - fetch the dependency graph with locks overlaid
//! - `concord locks release-all|sweep` - administrative lock operations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::{GraphCommand, LocksCommand, StatusCommand};

/// Concord - coordination service for concurrent coding agents
#[derive(Parser)]
#[command(name = "concord")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Base URL of a running Concord service (for client commands)
    #[arg(
        long,
        global = true,
        env = "CONCORD_URL",
        default_value = "http://127.0.0.1:7400"
    )]
    url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CONCORD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordination service
    Serve {
        /// Bind host (overrides CONCORD_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides CONCORD_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Agent coordination calls
    Status {
        #[command(subcommand)]
        command: StatusCommand,
    },

    /// Dependency graph operations
    Graph {
        #[command(subcommand)]
        command: GraphCommand,
    },

    /// Lock administration
    Locks {
        #[command(subcommand)]
        command: LocksCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(host, port).await,
        Commands::Status { command } => commands::status::handle_command(command, &cli.url).await,
        Commands::Graph { command } => commands::graph::handle_command(command, &cli.url).await,
        Commands::Locks { command } => commands::locks::handle_command(command, &cli.url).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
