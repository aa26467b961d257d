// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use concord_client::ConcordClient;

#[derive(Subcommand)]
pub enum GraphCommand {
    /// Fetch the dependency graph with live locks overlaid
    Get {
        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Force a full rebuild instead of the incremental diff
        #[arg(long)]
        regenerate: bool,

        /// Print the raw JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: GraphCommand, url: &str) -> Result<()> {
    match command {
        GraphCommand::Get {
            repo,
            branch,
            regenerate,
            json,
        } => {
            let client = ConcordClient::new(url);
            let graph = client.get_graph(&repo, &branch, regenerate).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&graph)?);
                return Ok(());
            }
            println!(
                "graph at {} ({} nodes, {} edges)",
                graph.version.cyan(),
                graph.nodes.len(),
                graph.edges.len()
            );
            for edge in &graph.edges {
                println!("  {} -> {}", edge.source, edge.target);
            }
            if graph.locks.is_empty() {
                println!("no live locks");
            } else {
                for (path, lock) in &graph.locks {
                    println!(
                        "  {} locked by {} ({}): {}",
                        path.yellow(),
                        lock.user_name,
                        lock.status,
                        lock.message
                    );
                }
            }
        }
    }
    Ok(())
}
