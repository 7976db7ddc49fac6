// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coding-agent selection.
//!
//! The hub drives two agent CLIs through the same app-server protocol;
//! the variant only selects the binary and its launch arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which coding-agent CLI backs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    #[default]
    Codex,
    Opencode,
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Codex => "codex",
            Agent::Opencode => "opencode",
        }
    }

    /// Binary name on PATH (host or container).
    pub fn binary(&self) -> &'static str {
        self.as_str()
    }

    /// Arguments that put the CLI into app-server mode.
    pub fn app_server_args(&self) -> &'static [&'static str] {
        match self {
            Agent::Codex => &["app-server"],
            Agent::Opencode => &["serve", "--format", "json"],
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error for unrecognized agent names.
#[derive(Debug, thiserror::Error)]
#[error("unknown agent: {0} (expected codex or opencode)")]
pub struct UnknownAgent(pub String);

impl FromStr for Agent {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "codex" => Ok(Agent::Codex),
            "opencode" => Ok(Agent::Opencode),
            other => Err(UnknownAgent(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
