// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::{RepoId, RunId};
use yare::parameterized;

fn sample_run() -> FlowRun {
    FlowRun::new(
        RunId::generate(1_000),
        FlowType::TicketFlow,
        RepoId::new("demo"),
        1_000,
    )
}

#[parameterized(
    pending = { FlowStatus::Pending, false },
    running = { FlowStatus::Running, false },
    paused = { FlowStatus::Paused, false },
    stopping = { FlowStatus::Stopping, false },
    completed = { FlowStatus::Completed, true },
    stopped = { FlowStatus::Stopped, true },
    failed = { FlowStatus::Failed, true },
)]
fn terminal_statuses(status: FlowStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.is_active(), !terminal);
}

#[test]
fn new_run_is_pending() {
    let run = sample_run();
    assert_eq!(run.status, FlowStatus::Pending);
    assert_eq!(run.version, RUN_RECORD_VERSION);
    assert!(run.finished_at_ms.is_none());
    assert!(!run.archived);
}

#[test]
fn finish_records_time() {
    let mut run = sample_run();
    run.status = FlowStatus::Running;
    run.finish(FlowStatus::Completed, 9_999);
    assert_eq!(run.status, FlowStatus::Completed);
    assert_eq!(run.finished_at_ms, Some(9_999));
}

#[test]
fn ticket_engine_state_created_on_demand() {
    let mut run = sample_run();
    assert!(run.state.ticket_engine.is_none());
    run.ticket_engine_mut().total_turns = 3;
    assert_eq!(run.state.ticket_engine.as_ref().unwrap().total_turns, 3);
}

#[test]
fn run_record_round_trips() {
    let mut run = sample_run();
    let engine = run.ticket_engine_mut();
    engine.current_ticket = Some("tickets/TICKET-001.md".to_string());
    engine.errored_tickets.insert(4, "turn_cap_exceeded".into());

    let json = serde_json::to_string(&run).unwrap();
    let back: FlowRun = serde_json::from_str(&json).unwrap();
    assert_eq!(back, run);
}

#[test]
fn versionless_record_upgrades_on_read() {
    // v0 records predate the version field; deserialization fills it in.
    let json = r#"{
        "run_id": "r0000000001000-deadbeef",
        "flow_type": "ticket_flow",
        "repo_id": "demo",
        "status": "running",
        "started_at_ms": 1000
    }"#;
    let run: FlowRun = serde_json::from_str(json).unwrap();
    assert_eq!(run.version, RUN_RECORD_VERSION);
    assert_eq!(run.status, FlowStatus::Running);
}

#[test]
fn status_display_is_snake_case() {
    assert_eq!(FlowStatus::Stopping.to_string(), "stopping");
    assert_eq!(FlowType::TicketFlow.to_string(), "ticket_flow");
}
