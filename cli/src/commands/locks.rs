// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use concord_client::ConcordClient;

#[derive(Subcommand)]
pub enum LocksCommand {
    /// Wipe every lock on a branch (administrative reset)
    ReleaseAll {
        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "main")]
        branch: String,
    },

    /// Trigger a stale-lock sweep on the running service
    Sweep {
        /// Shared secret, must match CONCORD_SWEEPER_SECRET on the service
        #[arg(long, env = "CONCORD_SWEEPER_SECRET")]
        secret: String,
    },
}

pub async fn handle_command(command: LocksCommand, url: &str) -> Result<()> {
    let client = ConcordClient::new(url);
    match command {
        LocksCommand::ReleaseAll { repo, branch } => {
            let released = client.release_all(&repo, &branch).await?;
            println!("released {} lock(s)", released.to_string().green());
        }
        LocksCommand::Sweep { secret } => {
            let report = client.cleanup_stale_locks(&secret).await?;
            println!("cleaned {} expired lock(s)", report.cleaned.to_string().green());
        }
    }
    Ok(())
}
