// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent-side coordination commands: check and post.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use concord_client::{CheckStatusArgs, ConcordClient, OrchestrationAction, PostStatusArgs};

#[derive(Subcommand)]
pub enum StatusCommand {
    /// Check staleness and conflicts for a set of files
    Check {
        /// Repository URL (any github.com spelling)
        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Files the agent wants to touch
        #[arg(long = "file", required = true)]
        files: Vec<String>,

        /// Commit id the agent's checkout is based on
        #[arg(long)]
        agent_head: String,
    },

    /// Post a lifecycle status (WRITING, READING, OPEN or a note)
    Post {
        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "main")]
        branch: String,

        #[arg(long = "file", required = true)]
        files: Vec<String>,

        #[arg(long)]
        status: String,

        /// Intent shown to other agents and observers
        #[arg(long)]
        message: String,

        #[arg(long)]
        agent_head: Option<String>,

        #[arg(long)]
        new_repo_head: Option<String>,

        /// Caller identity
        #[arg(long, env = "CONCORD_USER_ID")]
        user: String,

        #[arg(long, env = "CONCORD_USER_NAME")]
        name: Option<String>,
    },
}

pub async fn handle_command(command: StatusCommand, url: &str) -> Result<()> {
    match command {
        StatusCommand::Check {
            repo,
            branch,
            files,
            agent_head,
        } => {
            let client = ConcordClient::new(url);
            let report = client
                .check_status(&CheckStatusArgs {
                    repo_url: repo,
                    branch,
                    file_paths: files,
                    agent_head,
                })
                .await?;
            println!("status: {:?}", report.status);
            println!("repo head: {}", report.repo_head);
            for (path, lock) in &report.locks {
                println!(
                    "  {} locked by {} ({})",
                    path.yellow(),
                    lock.user_name,
                    lock.status
                );
            }
            for warning in &report.warnings {
                println!("  {} {warning}", "warning:".yellow());
            }
            print_orchestration(report.orchestration.action, &report.orchestration.reason);
        }
        StatusCommand::Post {
            repo,
            branch,
            files,
            status,
            message,
            agent_head,
            new_repo_head,
            user,
            name,
        } => {
            let client = ConcordClient::new(url)
                .with_user(user.clone(), name.unwrap_or(user));
            let outcome = client
                .post_status(&PostStatusArgs {
                    repo_url: repo,
                    branch,
                    file_paths: files,
                    status,
                    message,
                    agent_head,
                    new_repo_head,
                })
                .await?;
            if outcome.success {
                println!("{}", "ok".green());
            } else {
                println!("{}", "refused".red());
            }
            if let Some(locks) = &outcome.locks {
                println!("locked {} file(s)", locks.len());
            }
            if let Some(orphaned) = &outcome.orphaned_dependencies {
                for path in orphaned {
                    println!("  orphaned dependent: {}", path.yellow());
                }
            }
            print_orchestration(outcome.orchestration.action, &outcome.orchestration.reason);
            if let Some(command) = &outcome.orchestration.command {
                println!("  run: {}", command.cyan());
            }
        }
    }
    Ok(())
}

fn print_orchestration(action: OrchestrationAction, reason: &str) {
    let label = match action {
        OrchestrationAction::Proceed => "PROCEED".green(),
        OrchestrationAction::Pull => "PULL".cyan(),
        OrchestrationAction::Push => "PUSH".cyan(),
        OrchestrationAction::SwitchTask => "SWITCH_TASK".yellow(),
        OrchestrationAction::Wait => "WAIT".yellow(),
        OrchestrationAction::Stop => "STOP".red(),
    };
    println!("next: {label} - {reason}");
}
