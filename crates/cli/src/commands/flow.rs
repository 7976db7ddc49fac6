// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `car flow` - ticket flow runs.

use crate::client;
use crate::output::{handoff_line, print_json, run_line};
use anyhow::{bail, Result};
use car_core::{RepoId, RunId};
use car_daemon::protocol::{Request, Response};
use clap::Subcommand;
use std::path::Path;

#[derive(Debug, Subcommand)]
pub enum FlowCommand {
    /// The canonical ticket-driven flow
    #[command(name = "ticket_flow")]
    TicketFlow {
        #[command(subcommand)]
        command: TicketFlowCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum TicketFlowCommand {
    /// Start a run (or reuse the active one)
    Bootstrap {
        #[arg(long)]
        repo: String,
    },
    /// Alias for bootstrap
    Start {
        #[arg(long)]
        repo: String,
    },
    /// Resume a paused run
    Resume {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        run_id: String,
    },
    /// Request cooperative shutdown of a run
    Stop {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        run_id: String,
    },
    /// Show runs (newest first), or one run with --run-id
    Status {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        run_id: Option<String>,
        /// Include handoff history
        #[arg(long)]
        handoffs: bool,
    },
    /// Archive a run's tickets
    Archive {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        run_id: String,
        /// Archive a paused/stopping run
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(command: FlowCommand, hub_root: &Path, json: bool) -> Result<()> {
    let FlowCommand::TicketFlow { command } = command;
    match command {
        TicketFlowCommand::Bootstrap { repo } | TicketFlowCommand::Start { repo } => {
            let response = client::expect_ok(
                hub_root,
                Request::Bootstrap {
                    repo_id: RepoId::new(repo),
                },
            )
            .await?;
            let Response::Bootstrapped { run, hint } = response else {
                bail!("unexpected daemon response");
            };
            if json {
                return print_json(&serde_json::json!({
                    "id": run.run_id,
                    "state": run.state,
                    "status": run.status,
                    "hint": hint,
                }));
            }
            match hint {
                Some(hint) => println!("{}  ({})", run_line(&run), hint),
                None => println!("{}", run_line(&run)),
            }
            Ok(())
        }

        TicketFlowCommand::Resume { repo, run_id } => {
            client::expect_ok(
                hub_root,
                Request::Resume {
                    repo_id: RepoId::new(repo),
                    run_id: RunId::new(run_id),
                },
            )
            .await?;
            println!("resumed");
            Ok(())
        }

        TicketFlowCommand::Stop { repo, run_id } => {
            client::expect_ok(
                hub_root,
                Request::Stop {
                    repo_id: RepoId::new(repo),
                    run_id: RunId::new(run_id),
                },
            )
            .await?;
            println!("stop requested");
            Ok(())
        }

        TicketFlowCommand::Status {
            repo,
            run_id,
            handoffs,
        } => status(hub_root, repo, run_id, handoffs, json).await,

        TicketFlowCommand::Archive {
            repo,
            run_id,
            force,
        } => {
            let response = client::expect_ok(
                hub_root,
                Request::Archive {
                    repo_id: RepoId::new(repo),
                    run_id: RunId::new(run_id),
                    force,
                },
            )
            .await?;
            let Response::Archived { moved } = response else {
                bail!("unexpected daemon response");
            };
            println!("archived {} tickets", moved);
            Ok(())
        }
    }
}

async fn status(
    hub_root: &Path,
    repo: String,
    run_id: Option<String>,
    handoffs: bool,
    json: bool,
) -> Result<()> {
    let repo_id = RepoId::new(repo);
    match run_id {
        Some(run_id) => {
            let run_id = RunId::new(run_id);
            let response = client::expect_ok(
                hub_root,
                Request::Run {
                    repo_id: repo_id.clone(),
                    run_id: run_id.clone(),
                },
            )
            .await?;
            let Response::Run { run } = response else {
                bail!("unexpected daemon response");
            };
            if json {
                print_json(&run)?;
            } else {
                println!("{}", run_line(&run));
            }
            if handoffs {
                let response = client::expect_ok(
                    hub_root,
                    Request::HandoffHistory { repo_id, run_id },
                )
                .await?;
                let Response::Handoffs { handoffs } = response else {
                    bail!("unexpected daemon response");
                };
                if json {
                    print_json(&handoffs)?;
                } else {
                    for handoff in handoffs {
                        println!("{}", handoff_line(&handoff));
                    }
                }
            }
            Ok(())
        }
        None => {
            let response = client::expect_ok(hub_root, Request::Runs { repo_id }).await?;
            let Response::Runs { runs } = response else {
                bail!("unexpected daemon response");
            };
            if json {
                return print_json(&runs);
            }
            if runs.is_empty() {
                println!("no runs");
            }
            for run in runs {
                println!("{}", run_line(&run));
            }
            Ok(())
        }
    }
}
