// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow lifecycle events published on the hub event bus.
//!
//! Serializes with `{"type": "flow_started", ...fields}` format; the `type`
//! strings are a wire contract consumed by the web UI's SSE shim and by the
//! chat adapters. Subscribers may assume total order per `run_id`.

use crate::app_server::AppServerEvent;
use crate::handoff::HandoffMode;
use crate::id::RunId;
use serde::{Deserialize, Serialize};

/// Events emitted by the flow runtime for every externally-visible state
/// change. Every variant carries the run id and an epoch-ms timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    FlowStarted {
        run_id: RunId,
        timestamp: u64,
    },

    FlowCompleted {
        run_id: RunId,
        timestamp: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    FlowFailed {
        run_id: RunId,
        timestamp: u64,
        reason: String,
    },

    FlowStopped {
        run_id: RunId,
        timestamp: u64,
    },

    FlowPaused {
        run_id: RunId,
        timestamp: u64,
        /// Sequence of the pause handoff, when one caused the pause.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handoff_seq: Option<u64>,
    },

    FlowResumed {
        run_id: RunId,
        timestamp: u64,
    },

    /// The engine started working a ticket.
    StepStarted {
        run_id: RunId,
        timestamp: u64,
        ticket_index: u64,
        ticket_path: String,
    },

    /// A token delta from the agent's streamed output.
    AgentStreamDelta {
        run_id: RunId,
        timestamp: u64,
        ticket_index: u64,
        text: String,
    },

    /// A classified app-server envelope.
    AppServerEvent {
        run_id: RunId,
        timestamp: u64,
        ticket_index: u64,
        event: AppServerEvent,
    },

    HandoffDispatched {
        run_id: RunId,
        timestamp: u64,
        seq: u64,
        mode: HandoffMode,
        title: String,
    },

    /// Tickets moved to the archive directory.
    FlowArchived {
        run_id: RunId,
        timestamp: u64,
    },

    /// Lag marker: this subscriber missed `dropped_n` events. Delivered to
    /// the slow subscriber only; the bus never blocks publishers.
    Dropped {
        run_id: RunId,
        timestamp: u64,
        dropped_n: u64,
    },

    /// Terminal marker: the run reached a terminal status and the
    /// subscription is closed after this event.
    StreamClosed {
        run_id: RunId,
        timestamp: u64,
    },
}

impl FlowEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &RunId {
        match self {
            FlowEvent::FlowStarted { run_id, .. }
            | FlowEvent::FlowCompleted { run_id, .. }
            | FlowEvent::FlowFailed { run_id, .. }
            | FlowEvent::FlowStopped { run_id, .. }
            | FlowEvent::FlowPaused { run_id, .. }
            | FlowEvent::FlowResumed { run_id, .. }
            | FlowEvent::StepStarted { run_id, .. }
            | FlowEvent::AgentStreamDelta { run_id, .. }
            | FlowEvent::AppServerEvent { run_id, .. }
            | FlowEvent::HandoffDispatched { run_id, .. }
            | FlowEvent::FlowArchived { run_id, .. }
            | FlowEvent::Dropped { run_id, .. }
            | FlowEvent::StreamClosed { run_id, .. } => run_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            FlowEvent::FlowStarted { timestamp, .. }
            | FlowEvent::FlowCompleted { timestamp, .. }
            | FlowEvent::FlowFailed { timestamp, .. }
            | FlowEvent::FlowStopped { timestamp, .. }
            | FlowEvent::FlowPaused { timestamp, .. }
            | FlowEvent::FlowResumed { timestamp, .. }
            | FlowEvent::StepStarted { timestamp, .. }
            | FlowEvent::AgentStreamDelta { timestamp, .. }
            | FlowEvent::AppServerEvent { timestamp, .. }
            | FlowEvent::HandoffDispatched { timestamp, .. }
            | FlowEvent::FlowArchived { timestamp, .. }
            | FlowEvent::Dropped { timestamp, .. }
            | FlowEvent::StreamClosed { timestamp, .. } => *timestamp,
        }
    }

    /// True for the events that end a subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowEvent::StreamClosed { .. })
    }

    /// One-line summary for activity logs.
    pub fn log_summary(&self) -> String {
        match self {
            FlowEvent::FlowStarted { run_id, .. } => {
                format!("flow started run={}", run_id.short(12))
            }
            FlowEvent::FlowCompleted { run_id, reason, .. } => match reason {
                Some(r) => format!("flow completed run={} reason={}", run_id.short(12), r),
                None => format!("flow completed run={}", run_id.short(12)),
            },
            FlowEvent::FlowFailed { run_id, reason, .. } => {
                format!("flow failed run={} reason={}", run_id.short(12), reason)
            }
            FlowEvent::FlowStopped { run_id, .. } => {
                format!("flow stopped run={}", run_id.short(12))
            }
            FlowEvent::FlowPaused { run_id, .. } => {
                format!("flow paused run={}", run_id.short(12))
            }
            FlowEvent::FlowResumed { run_id, .. } => {
                format!("flow resumed run={}", run_id.short(12))
            }
            FlowEvent::StepStarted {
                run_id,
                ticket_index,
                ..
            } => format!(
                "step started run={} ticket={}",
                run_id.short(12),
                ticket_index
            ),
            FlowEvent::AgentStreamDelta { ticket_index, .. } => {
                format!("stream delta ticket={}", ticket_index)
            }
            FlowEvent::AppServerEvent { event, .. } => {
                format!("app-server {}", event.kind)
            }
            FlowEvent::HandoffDispatched { seq, mode, .. } => {
                format!("handoff #{} mode={}", seq, mode)
            }
            FlowEvent::FlowArchived { run_id, .. } => {
                format!("flow archived run={}", run_id.short(12))
            }
            FlowEvent::Dropped { dropped_n, .. } => format!("dropped {} events", dropped_n),
            FlowEvent::StreamClosed { run_id, .. } => {
                format!("stream closed run={}", run_id.short(12))
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
