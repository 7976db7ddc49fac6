// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::StateRoot;
use car_core::{MirrorDirection, MirrorRecord, RunId};
use std::fs;
use tempfile::TempDir;

fn record(ts: u64, direction: MirrorDirection, text: &str) -> MirrorRecord {
    MirrorRecord {
        ts,
        direction,
        platform: Some("telegram".to_string()),
        chat_id: Some("123".to_string()),
        thread_id: None,
        message_id: None,
        actor: Some("operator".to_string()),
        kind: "message".to_string(),
        text: text.to_string(),
        meta: serde_json::Value::Null,
    }
}

#[test]
fn inbound_and_outbound_are_separate_files() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());
    let run_id = RunId::new("r0000000001000-aa");

    append_chat_mirror(&root, &run_id, &record(1, MirrorDirection::Inbound, "hi")).unwrap();
    append_chat_mirror(&root, &run_id, &record(2, MirrorDirection::Outbound, "yo")).unwrap();

    let inbound = read_chat_mirror(&root, &run_id, MirrorDirection::Inbound).unwrap();
    let outbound = read_chat_mirror(&root, &run_id, MirrorDirection::Outbound).unwrap();
    assert_eq!(inbound.len(), 1);
    assert_eq!(outbound.len(), 1);
    assert_eq!(inbound[0].text, "hi");
    assert_eq!(outbound[0].text, "yo");
}

#[test]
fn appends_preserve_prior_content() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());
    let run_id = RunId::new("r0000000001000-bb");
    let path = root.chat_dir(&run_id).unwrap().join("inbound.jsonl");

    let mut snapshots = Vec::new();
    for i in 0..4u64 {
        append_chat_mirror(&root, &run_id, &record(i, MirrorDirection::Inbound, "m")).unwrap();
        snapshots.push(fs::read_to_string(&path).unwrap());
    }
    for pair in snapshots.windows(2) {
        assert!(pair[1].starts_with(&pair[0]));
    }
}

#[test]
fn delivery_mirror_grows_one_line_per_record() {
    let tmp = TempDir::new().unwrap();
    let root = StateRoot::new(tmp.path());

    append_delivery_record(&root, &serde_json::json!({"turn_id": "t1"})).unwrap();
    append_delivery_record(&root, &serde_json::json!({"turn_id": "t2"})).unwrap();

    let content = fs::read_to_string(root.deliveries_path()).unwrap();
    assert_eq!(content.lines().count(), 2);
}
