// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow run record and status state machine.

use crate::id::{RepoId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current schema version for `run.json`.
pub const RUN_RECORD_VERSION: u32 = 1;

/// Kind of flow driving a run. Ticket flow is the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    #[default]
    TicketFlow,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::TicketFlow => "ticket_flow",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a flow run.
///
/// `pending → running → (paused ↔ running) → {completed | stopped | failed}`.
/// Terminal statuses are irreversible; a fresh start requires a new run id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    Running,
    Paused,
    /// Cooperative shutdown requested, engine winding down.
    Stopping,
    Completed,
    Stopped,
    Failed,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Completed | FlowStatus::Stopped | FlowStatus::Failed
        )
    }

    /// Active means the run still counts against the one-active-run-per-repo
    /// invariant.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowStatus::Pending => "pending",
            FlowStatus::Running => "running",
            FlowStatus::Paused => "paused",
            FlowStatus::Stopping => "stopping",
            FlowStatus::Completed => "completed",
            FlowStatus::Stopped => "stopped",
            FlowStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Ticket-engine progress persisted inside the run record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEngineState {
    /// Path of the ticket currently being worked, relative to the repo root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ticket: Option<String>,
    /// Turns spent on the current ticket.
    #[serde(default)]
    pub ticket_turns: u32,
    /// Turns spent across the whole run.
    #[serde(default)]
    pub total_turns: u32,
    /// Why the engine last stopped advancing ("no tickets",
    /// "turn_cap_exceeded", "stop_timeout", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_details: Option<String>,
    /// Ticket index → error marker. Errored tickets are skipped for the
    /// remainder of the run but never marked done.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errored_tickets: BTreeMap<u64, String>,
}

/// Flow-type-specific state blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_engine: Option<TicketEngineState>,
}

/// One invocation of a flow against a repo. Persisted as
/// `flows/<run_id>/run.json`; mutated only through FlowRuntime transitions,
/// never deleted (archived instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRun {
    #[serde(default = "default_version")]
    pub version: u32,
    pub run_id: RunId,
    pub flow_type: FlowType,
    pub repo_id: RepoId,
    pub status: FlowStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub state: RunState,
    /// Set once the run's tickets have been moved to `tickets_archive/`.
    #[serde(default)]
    pub archived: bool,
}

fn default_version() -> u32 {
    RUN_RECORD_VERSION
}

impl FlowRun {
    /// Create a new pending run.
    pub fn new(run_id: RunId, flow_type: FlowType, repo_id: RepoId, epoch_ms: u64) -> Self {
        Self {
            version: RUN_RECORD_VERSION,
            run_id,
            flow_type,
            repo_id,
            status: FlowStatus::Pending,
            started_at_ms: epoch_ms,
            finished_at_ms: None,
            exit_code: None,
            error_message: None,
            state: RunState::default(),
            archived: false,
        }
    }

    /// Mutable access to the ticket-engine state, creating it on first use.
    pub fn ticket_engine_mut(&mut self) -> &mut TicketEngineState {
        self.state.ticket_engine.get_or_insert_with(Default::default)
    }

    /// Transition to a terminal status, recording the finish time.
    pub fn finish(&mut self, status: FlowStatus, epoch_ms: u64) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at_ms = Some(epoch_ms);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
