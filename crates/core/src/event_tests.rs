// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::app_server::{AppServerEvent, AppServerEventKind, MergeStrategy};
use crate::handoff::HandoffMode;
use crate::id::RunId;

fn rid() -> RunId {
    RunId::new("r0000000001000-cafef00d")
}

#[test]
fn type_tags_are_snake_case() {
    let event = FlowEvent::FlowStarted {
        run_id: rid(),
        timestamp: 1,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "flow_started");
    assert_eq!(json["run_id"], "r0000000001000-cafef00d");

    let event = FlowEvent::StepStarted {
        run_id: rid(),
        timestamp: 2,
        ticket_index: 1,
        ticket_path: "tickets/TICKET-001.md".to_string(),
    };
    assert_eq!(serde_json::to_value(&event).unwrap()["type"], "step_started");
}

#[test]
fn dropped_marker_carries_count() {
    let event = FlowEvent::Dropped {
        run_id: rid(),
        timestamp: 3,
        dropped_n: 17,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "dropped");
    assert_eq!(json["dropped_n"], 17);
}

#[test]
fn stream_closed_is_terminal() {
    let closed = FlowEvent::StreamClosed {
        run_id: rid(),
        timestamp: 4,
    };
    assert!(closed.is_terminal());
    assert!(!FlowEvent::FlowStarted {
        run_id: rid(),
        timestamp: 4
    }
    .is_terminal());
}

#[test]
fn accessors_cover_all_variants() {
    let events = vec![
        FlowEvent::FlowStarted { run_id: rid(), timestamp: 1 },
        FlowEvent::FlowCompleted { run_id: rid(), timestamp: 2, reason: None },
        FlowEvent::FlowFailed { run_id: rid(), timestamp: 3, reason: "x".into() },
        FlowEvent::FlowStopped { run_id: rid(), timestamp: 4 },
        FlowEvent::FlowPaused { run_id: rid(), timestamp: 5, handoff_seq: Some(1) },
        FlowEvent::FlowResumed { run_id: rid(), timestamp: 6 },
        FlowEvent::HandoffDispatched {
            run_id: rid(),
            timestamp: 7,
            seq: 1,
            mode: HandoffMode::Notify,
            title: "t".into(),
        },
        FlowEvent::FlowArchived { run_id: rid(), timestamp: 8 },
        FlowEvent::StreamClosed { run_id: rid(), timestamp: 9 },
    ];
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.run_id(), &rid());
        assert_eq!(event.timestamp(), i as u64 + 1);
        assert!(!event.log_summary().is_empty());
    }
}

#[test]
fn app_server_event_round_trips() {
    let event = FlowEvent::AppServerEvent {
        run_id: rid(),
        timestamp: 10,
        ticket_index: 2,
        event: AppServerEvent {
            kind: AppServerEventKind::Command,
            item_id: Some("item-1".into()),
            title: "cargo test".into(),
            summary: String::new(),
            detail: None,
            method: Some("exec_command_begin".into()),
            time: 10,
            merge_strategy: MergeStrategy::None,
            raw: None,
        },
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: FlowEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
