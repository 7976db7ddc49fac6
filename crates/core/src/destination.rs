// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Where agent processes execute: the host shell or a container.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A bind mount for container destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Execution destination for agent processes.
///
/// Resolution order for a worktree: its own destination, else its base
/// repo's, else `local` (see `Manifest::resolve_destination`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    #[default]
    Local,
    Docker {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_name: Option<String>,
        /// Preflight profile; `full-dev` verifies the agent toolchain.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
        /// Host environment variables forwarded into the container.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env_passthrough: Vec<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mounts: Vec<Mount>,
    },
}

impl Destination {
    pub fn is_local(&self) -> bool {
        matches!(self, Destination::Local)
    }

    /// Short tag for logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Local => "local",
            Destination::Docker { .. } => "docker",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Local => write!(f, "local"),
            Destination::Docker { image, .. } => write!(f, "docker:{}", image),
        }
    }
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod tests;
