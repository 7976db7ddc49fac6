// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use car_core::{FlowStatus, FlowType, HandoffMode, RepoId, RunId};

#[test]
fn run_line_includes_engine_state() {
    let mut run = car_core::FlowRun::new(
        RunId::new("r0000000001000-aa"),
        FlowType::TicketFlow,
        RepoId::new("demo"),
        1_000,
    );
    run.status = FlowStatus::Running;
    let engine = run.ticket_engine_mut();
    engine.total_turns = 3;
    engine.reason = Some("turn_cap_exceeded".to_string());
    engine.current_ticket = Some("tickets/TICKET-004.md".to_string());

    let line = run_line(&run);
    assert!(line.contains("r0000000001000-aa"));
    assert!(line.contains("running"));
    assert!(line.contains("turns=3"));
    assert!(line.contains("reason=turn_cap_exceeded"));
    assert!(line.contains("ticket=tickets/TICKET-004.md"));
}

#[test]
fn handoff_line_format() {
    let handoff = car_core::HandoffDispatch {
        seq: 2,
        mode: HandoffMode::Pause,
        title: "Need input".to_string(),
        body: String::new(),
        attachments: Vec::new(),
        created_at: "2026-05-01T00:00:00Z".to_string(),
    };
    assert_eq!(
        handoff_line(&handoff),
        "#2  pause  2026-05-01T00:00:00Z  Need input"
    );
}
