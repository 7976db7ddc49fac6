// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `car hub` - repos and destinations.

use crate::client;
use crate::output::print_json;
use anyhow::{bail, Result};
use car_core::{Destination, Mount, RepoId};
use car_daemon::protocol::{Request, Response};
use car_storage::{RepoEntry, RepoKind};
use clap::{Args, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Subcommand)]
pub enum HubCommand {
    /// Show or set a repo's execution destination
    Destination {
        #[command(subcommand)]
        command: DestinationCommand,
    },
    /// Manage the repo manifest
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum DestinationCommand {
    /// Show the effective destination for a repo
    Show { repo_id: String },
    /// Set the destination for a repo
    Set {
        repo_id: String,
        #[command(subcommand)]
        destination: DestinationKind,
    },
}

#[derive(Debug, Subcommand)]
pub enum DestinationKind {
    /// Run agent processes on the host
    Local,
    /// Run agent processes in a container
    Docker(DockerArgs),
    /// Clear the override (inherit from base repo, else local)
    Inherit,
}

#[derive(Debug, Args)]
pub struct DockerArgs {
    /// Container image
    #[arg(long)]
    pub image: String,
    #[arg(long)]
    pub container_name: Option<String>,
    /// Preflight profile (e.g. full-dev)
    #[arg(long)]
    pub profile: Option<String>,
    #[arg(long)]
    pub workdir: Option<String>,
    /// Host env vars forwarded into the container (repeatable)
    #[arg(long = "env-passthrough")]
    pub env_passthrough: Vec<String>,
    /// KEY=VALUE env vars set in the container (repeatable)
    #[arg(long = "env")]
    pub env: Vec<String>,
    /// Bind mounts source:target[:ro] (repeatable)
    #[arg(long = "mount")]
    pub mounts: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum RepoCommand {
    /// Add or update a repo
    Add {
        repo_id: String,
        path: PathBuf,
        /// Register as a worktree of this base repo
        #[arg(long)]
        worktree_of: Option<String>,
    },
    /// Remove a repo from the manifest
    Rm { repo_id: String },
}

pub async fn run(command: HubCommand, hub_root: &Path, json: bool) -> Result<()> {
    match command {
        HubCommand::Destination { command } => destination(command, hub_root, json).await,
        HubCommand::Repo { command } => repo(command, hub_root).await,
    }
}

async fn destination(command: DestinationCommand, hub_root: &Path, json: bool) -> Result<()> {
    match command {
        DestinationCommand::Show { repo_id } => {
            let response = client::expect_ok(
                hub_root,
                Request::DestinationShow {
                    repo_id: RepoId::new(repo_id),
                },
            )
            .await?;
            let Response::Destination { destination } = response else {
                bail!("unexpected daemon response");
            };
            if json {
                return print_json(&destination);
            }
            println!("{}", destination);
            Ok(())
        }
        DestinationCommand::Set {
            repo_id,
            destination,
        } => {
            let destination = match destination {
                DestinationKind::Local => Some(Destination::Local),
                DestinationKind::Inherit => None,
                DestinationKind::Docker(args) => Some(parse_docker(args)?),
            };
            client::expect_ok(
                hub_root,
                Request::DestinationSet {
                    repo_id: RepoId::new(repo_id),
                    destination,
                },
            )
            .await?;
            println!("destination updated");
            Ok(())
        }
    }
}

fn parse_docker(args: DockerArgs) -> Result<Destination> {
    let mut env = HashMap::new();
    for pair in &args.env {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--env expects KEY=VALUE, got {:?}", pair);
        };
        env.insert(key.to_string(), value.to_string());
    }
    let mut mounts = Vec::new();
    for mount in &args.mounts {
        mounts.push(parse_mount(mount)?);
    }
    Ok(Destination::Docker {
        image: args.image,
        container_name: args.container_name,
        profile: args.profile,
        workdir: args.workdir,
        env_passthrough: args.env_passthrough,
        env,
        mounts,
    })
}

fn parse_mount(raw: &str) -> Result<Mount> {
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.as_slice() {
        [source, target] => Ok(Mount {
            source: source.to_string(),
            target: target.to_string(),
            read_only: false,
        }),
        [source, target, "ro"] => Ok(Mount {
            source: source.to_string(),
            target: target.to_string(),
            read_only: true,
        }),
        _ => bail!("--mount expects source:target[:ro], got {:?}", raw),
    }
}

async fn repo(command: RepoCommand, hub_root: &Path) -> Result<()> {
    match command {
        RepoCommand::Add {
            repo_id,
            path,
            worktree_of,
        } => {
            let entry = RepoEntry {
                path,
                kind: if worktree_of.is_some() {
                    RepoKind::Worktree
                } else {
                    RepoKind::Base
                },
                worktree_of: worktree_of.map(RepoId::new),
                initialized: true,
                destination: None,
            };
            client::expect_ok(
                hub_root,
                Request::RepoUpsert {
                    repo_id: RepoId::new(repo_id),
                    entry,
                },
            )
            .await?;
            println!("repo added");
            Ok(())
        }
        RepoCommand::Rm { repo_id } => {
            client::expect_ok(
                hub_root,
                Request::RepoRemove {
                    repo_id: RepoId::new(repo_id),
                },
            )
            .await?;
            println!("repo removed");
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
