// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex AutoRunner CLI (car)
//!
//! Operator front end for the hub daemon: PMA delivery targets, repo
//! destinations, and ticket-flow runs.

mod client;
mod commands;
mod daemon_process;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "car", version, about = "Codex AutoRunner hub CLI")]
struct Cli {
    /// Hub root directory (defaults to CAR_HUB_ROOT, then cwd)
    #[arg(long, global = true)]
    hub: Option<PathBuf>,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// PMA delivery management
    Pma {
        #[command(subcommand)]
        command: commands::pma::PmaCommand,
    },
    /// Hub-level repo and destination management
    Hub {
        #[command(subcommand)]
        command: commands::hub::HubCommand,
    },
    /// Flow runs
    Flow {
        #[command(subcommand)]
        command: commands::flow::FlowCommand,
    },
    /// Daemon control
    Daemon {
        #[command(subcommand)]
        command: commands::daemon::DaemonCommand,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let hub_root = cli
        .hub
        .clone()
        .unwrap_or_else(car_daemon::env::hub_root);

    let result = match cli.command {
        Command::Pma { command } => commands::pma::run(command, &hub_root, cli.json).await,
        Command::Hub { command } => commands::hub::run(command, &hub_root, cli.json).await,
        Command::Flow { command } => commands::flow::run(command, &hub_root, cli.json).await,
        Command::Daemon { command } => commands::daemon::run(command, &hub_root).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
