// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured-reply parsing.
//!
//! Both agents answer a ticket turn with a JSON reply object; the engine
//! reads two things out of it: whether the ticket is complete, and any
//! handoff the agent wants dispatched to the operator.

use car_core::HandoffMode;
use serde_json::Value;

/// A handoff the agent asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffRequest {
    pub mode: HandoffMode,
    pub title: String,
    pub body: String,
    pub attachments: Vec<String>,
}

/// What the engine extracts from one structured reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    pub ticket_complete: bool,
    pub handoff: Option<HandoffRequest>,
    pub summary: Option<String>,
}

fn parse_mode(s: &str) -> Option<HandoffMode> {
    match s {
        "notify" => Some(HandoffMode::Notify),
        "pause" => Some(HandoffMode::Pause),
        "resolve" => Some(HandoffMode::Resolve),
        _ => None,
    }
}

/// Extract a handoff request from a JSON object shaped like
/// `{"mode": "pause", "title": ..., "body": ..., "attachments": [...]}`.
pub(crate) fn parse_handoff(value: &Value) -> Option<HandoffRequest> {
    let mode = parse_mode(value.get("mode")?.as_str()?)?;
    Some(HandoffRequest {
        mode,
        title: value
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("Handoff")
            .to_string(),
        body: value
            .get("body")
            .and_then(|b| b.as_str())
            .unwrap_or_default()
            .to_string(),
        attachments: value
            .get("attachments")
            .and_then(|a| a.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Parse the agent's end-of-turn reply. Unknown shapes yield the default
/// (ticket not complete, no handoff) — a malformed reply never crashes the
/// engine.
pub fn parse_reply(reply: &Value) -> ParsedReply {
    ParsedReply {
        ticket_complete: reply
            .get("ticket_complete")
            .and_then(|c| c.as_bool())
            .unwrap_or(false),
        handoff: reply.get("handoff").and_then(parse_handoff),
        summary: reply
            .get("summary")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
