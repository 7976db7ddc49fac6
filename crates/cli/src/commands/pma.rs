// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `car pma` - PMA delivery targets and manual delivery.

use crate::client;
use crate::output::print_json;
use anyhow::{bail, Result};
use car_daemon::protocol::{Request, Response};
use clap::Subcommand;
use std::path::Path;

#[derive(Debug, Subcommand)]
pub enum PmaCommand {
    /// Manage delivery targets
    Targets {
        #[command(subcommand)]
        command: TargetsCommand,
    },
    /// Deliver a message to all configured targets
    Deliver {
        /// Turn id (or dispatch id with --dispatch)
        id: String,
        /// Message text
        text: String,
        /// Route as a dispatch (bypasses per-turn dedupe)
        #[arg(long)]
        dispatch: bool,
    },
    /// Inspect and resolve dispatch files
    Dispatches {
        #[command(subcommand)]
        command: DispatchesCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum DispatchesCommand {
    /// List dispatches, newest first
    List,
    /// Mark a dispatch resolved
    Resolve { stem: String },
}

#[derive(Debug, Subcommand)]
pub enum TargetsCommand {
    /// List configured targets
    List,
    /// Add a target by ref (web, local:<path>, chat:telegram:<id>[:<thread>], chat:discord:<id>)
    Add { target_ref: String },
    /// Remove a target by ref
    Rm { target_ref: String },
    /// Remove all targets
    Clear,
}

pub async fn run(command: PmaCommand, hub_root: &Path, json: bool) -> Result<()> {
    match command {
        PmaCommand::Targets { command } => targets(command, hub_root, json).await,
        PmaCommand::Deliver { id, text, dispatch } => {
            let response = client::expect_ok(
                hub_root,
                Request::PmaDeliver {
                    id,
                    text,
                    is_dispatch: dispatch,
                },
            )
            .await?;
            let Response::Delivered { outcome } = response else {
                bail!("unexpected daemon response");
            };
            if json {
                return print_json(&outcome);
            }
            println!("delivery_status: {}", outcome.delivery_status);
            for target in &outcome.targets {
                let status = if let Some(skip) = &target.skipped {
                    format!("skipped ({skip})")
                } else if target.ok {
                    format!("ok ({} chunks)", target.chunks_sent)
                } else {
                    format!("failed: {}", target.error.as_deref().unwrap_or("unknown"))
                };
                println!("  {}  {}", target.target_key, status);
            }
            Ok(())
        }
        PmaCommand::Dispatches { command } => dispatches(command, hub_root, json).await,
    }
}

async fn dispatches(command: DispatchesCommand, hub_root: &Path, json: bool) -> Result<()> {
    match command {
        DispatchesCommand::List => {
            let response = client::expect_ok(hub_root, Request::Dispatches).await?;
            let Response::Dispatches { dispatches } = response else {
                bail!("unexpected daemon response");
            };
            if json {
                return print_json(&dispatches);
            }
            if dispatches.is_empty() {
                println!("no dispatches");
            }
            for dispatch in dispatches {
                let state = match &dispatch.resolved_at {
                    Some(at) => format!("resolved {}", at),
                    None => "open".to_string(),
                };
                println!(
                    "{}  [{}]  {}  {}",
                    dispatch.id, dispatch.priority, state, dispatch.title
                );
            }
            Ok(())
        }
        DispatchesCommand::Resolve { stem } => {
            client::expect_ok(hub_root, Request::DispatchResolve { stem }).await?;
            println!("dispatch resolved");
            Ok(())
        }
    }
}

async fn targets(command: TargetsCommand, hub_root: &Path, json: bool) -> Result<()> {
    let request = match command {
        TargetsCommand::List => Request::TargetsList,
        TargetsCommand::Add { target_ref } => Request::TargetsAdd { target_ref },
        TargetsCommand::Rm { target_ref } => Request::TargetsRemove { target_ref },
        TargetsCommand::Clear => Request::TargetsClear,
    };
    let response = client::expect_ok(hub_root, request).await?;
    let Response::Targets {
        targets,
        last_delivery_by_target,
    } = response
    else {
        bail!("unexpected daemon response");
    };

    if json {
        return print_json(&serde_json::json!({
            "targets": targets,
            "last_delivery_by_target": last_delivery_by_target,
        }));
    }
    if targets.is_empty() {
        println!("no delivery targets configured");
        return Ok(());
    }
    for target in targets {
        match last_delivery_by_target.get(&target) {
            Some(turn) => println!("{}  (last: {})", target, turn),
            None => println!("{}", target),
        }
    }
    Ok(())
}
