// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat mirror records.
//!
//! Every inbound chat message and every outbound delivery is appended to a
//! per-run JSONL mirror. Mirrors are the replay/debugging source of truth;
//! the event bus itself is not durable.

use serde::{Deserialize, Serialize};

/// Direction of a mirrored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorDirection {
    Inbound,
    Outbound,
}

/// One line of `flows/<run_id>/chat/{inbound,outbound}.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRecord {
    /// Epoch milliseconds.
    pub ts: u64,
    pub direction: MirrorDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Who wrote the message ("operator", "agent", a username).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Record kind ("message", "delivery", "command", ...).
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl MirrorRecord {
    /// Minimal outbound delivery record.
    pub fn outbound_delivery(ts: u64, text: impl Into<String>) -> Self {
        Self {
            ts,
            direction: MirrorDirection::Outbound,
            platform: None,
            chat_id: None,
            thread_id: None,
            message_id: None,
            actor: Some("pma".to_string()),
            kind: "delivery".to_string(),
            text: text.into(),
            meta: serde_json::Value::Null,
        }
    }
}
