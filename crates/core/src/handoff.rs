// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handoff dispatches: operator-visible notices emitted by the agent.
//!
//! Persisted append-only under `flows/<run_id>/handoffs/<seq>.json` with a
//! dense sequence starting at 1.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a handoff asks of the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// Informational; the run keeps going.
    Notify,
    /// The run transitions to `paused` until resumed.
    Pause,
    /// Marks an earlier pause as addressed.
    Resolve,
}

impl fmt::Display for HandoffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandoffMode::Notify => "notify",
            HandoffMode::Pause => "pause",
            HandoffMode::Resolve => "resolve",
        };
        write!(f, "{}", s)
    }
}

/// One handoff record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffDispatch {
    /// Dense per-run sequence, starts at 1. Assigned atomically on append.
    pub seq: u64,
    pub mode: HandoffMode,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// ISO-8601 creation time.
    pub created_at: String,
}

impl HandoffDispatch {
    pub fn is_pause(&self) -> bool {
        self.mode == HandoffMode::Pause
    }
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
