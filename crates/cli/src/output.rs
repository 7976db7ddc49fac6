// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output helpers shared by the commands.

use anyhow::Result;
use car_core::{FlowRun, HandoffDispatch};
use serde::Serialize;

/// Print a value as pretty JSON (for `--json`).
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line human summary of a run.
pub fn run_line(run: &FlowRun) -> String {
    let mut line = format!(
        "{}  {}  {}",
        run.run_id,
        run.status,
        run.repo_id
    );
    if let Some(engine) = &run.state.ticket_engine {
        line.push_str(&format!("  turns={}", engine.total_turns));
        if let Some(reason) = &engine.reason {
            line.push_str(&format!("  reason={}", reason));
        }
        if let Some(ticket) = &engine.current_ticket {
            line.push_str(&format!("  ticket={}", ticket));
        }
    }
    line
}

/// One-line human summary of a handoff.
pub fn handoff_line(handoff: &HandoffDispatch) -> String {
    format!(
        "#{}  {}  {}  {}",
        handoff.seq, handoff.mode, handoff.created_at, handoff.title
    )
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
