// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::StateRoot;
use car_core::{HandoffMode, RunId};
use tempfile::TempDir;

fn new_handoff(mode: HandoffMode, title: &str) -> NewHandoff {
    NewHandoff {
        mode,
        title: title.to_string(),
        body: String::new(),
        attachments: Vec::new(),
    }
}

#[test]
fn seq_is_dense_from_one() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());
    let run_id = RunId::new("r0000000001000-aa");

    for i in 1..=3u64 {
        let dispatch = append_handoff(
            &root,
            &run_id,
            new_handoff(HandoffMode::Notify, "n"),
            "2026-01-01T00:00:00Z".to_string(),
        )
        .unwrap();
        assert_eq!(dispatch.seq, i);
    }

    let listed = list_handoffs(&root, &run_id).unwrap();
    let seqs: Vec<u64> = listed.iter().map(|h| h.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn empty_run_has_no_handoffs() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());
    assert!(list_handoffs(&root, &RunId::new("r-x")).unwrap().is_empty());
}

#[test]
fn seq_continues_after_reload() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());
    let run_id = RunId::new("r0000000001000-bb");

    append_handoff(
        &root,
        &run_id,
        new_handoff(HandoffMode::Pause, "p"),
        "t".to_string(),
    )
    .unwrap();
    // Fresh call (new lock, re-scan) continues the dense sequence.
    let second = append_handoff(
        &root,
        &run_id,
        new_handoff(HandoffMode::Resolve, "r"),
        "t".to_string(),
    )
    .unwrap();
    assert_eq!(second.seq, 2);
}

#[test]
fn pause_mode_round_trips() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());
    let run_id = RunId::new("r0000000001000-cc");

    append_handoff(
        &root,
        &run_id,
        NewHandoff {
            mode: HandoffMode::Pause,
            title: "Need input".to_string(),
            body: "Choose an API version".to_string(),
            attachments: vec!["notes.md".to_string()],
        },
        "2026-03-01T10:00:00Z".to_string(),
    )
    .unwrap();

    let listed = list_handoffs(&root, &run_id).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_pause());
    assert_eq!(listed[0].attachments, vec!["notes.md"]);
}
