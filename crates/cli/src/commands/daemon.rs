// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `car daemon` - daemon control.

use crate::client;
use anyhow::{bail, Result};
use car_daemon::protocol::{Request, Response};
use clap::Subcommand;
use std::path::Path;

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon (no-op when already running)
    Start,
    /// Request daemon shutdown
    Stop,
    /// Check whether the daemon answers
    Status,
}

pub async fn run(command: DaemonCommand, hub_root: &Path) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            client::connect(hub_root).await?;
            println!("daemon running");
            Ok(())
        }
        DaemonCommand::Stop => {
            match client::request(hub_root, Request::Shutdown).await {
                Ok(Response::ShuttingDown) => {
                    println!("daemon stopping");
                    Ok(())
                }
                Ok(other) => bail!("unexpected daemon response: {other:?}"),
                Err(e) => bail!("daemon not reachable: {e:#}"),
            }
        }
        DaemonCommand::Status => {
            let socket = car_daemon::env::socket_path(hub_root);
            match tokio::net::UnixStream::connect(&socket).await {
                Ok(_) => {
                    // A fresh exchange confirms it actually answers.
                    match client::request(hub_root, Request::Ping).await? {
                        Response::Pong => {
                            println!("daemon running ({})", socket.display());
                            Ok(())
                        }
                        other => bail!("unexpected daemon response: {other:?}"),
                    }
                }
                Err(_) => {
                    println!("daemon not running");
                    std::process::exit(1);
                }
            }
        }
    }
}
