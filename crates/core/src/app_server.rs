// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Classification of raw app-server envelopes.
//!
//! Agent CLIs in app-server mode emit schemaless JSON envelopes. Both the
//! UI and the handoff detector consume them through one classification
//! function whose output is a stable record type; unrecognized envelopes
//! land in `Unknown` with the raw payload preserved.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What an envelope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppServerEventKind {
    Thinking,
    Command,
    ToolCall,
    FileEdit,
    Message,
    Unknown,
}

impl fmt::Display for AppServerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppServerEventKind::Thinking => "thinking",
            AppServerEventKind::Command => "command",
            AppServerEventKind::ToolCall => "tool_call",
            AppServerEventKind::FileEdit => "file_edit",
            AppServerEventKind::Message => "message",
            AppServerEventKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// How a UI should fold this entry into the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Same `item_id`: concatenate onto the previous entry.
    Append,
    /// Append as a new line under the previous entry.
    Newline,
    #[default]
    None,
}

/// Stable classified form of one envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppServerEvent {
    pub kind: AppServerEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The protocol method, when the envelope was a JSON-RPC notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Epoch milliseconds (envelope time when present, else receipt time).
    pub time: u64,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Raw payload, kept only for `Unknown` envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

fn get_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// First non-empty string among the usual text-bearing fields.
fn text_of(params: &Value) -> String {
    for key in ["text", "delta", "message", "content"] {
        if let Some(s) = get_str(params, key) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    String::new()
}

fn truncated(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n {
        out.push('…');
    }
    out
}

/// Classify one raw envelope into a stable [`AppServerEvent`].
///
/// `received_at_ms` supplies the timestamp when the envelope carries none.
pub fn classify_envelope(raw: &Value, received_at_ms: u64) -> AppServerEvent {
    let method = get_str(raw, "method").map(|m| m.to_string());
    let params = raw.get("params").unwrap_or(raw);
    let item_id = get_str(params, "itemId")
        .or_else(|| get_str(params, "item_id"))
        .or_else(|| get_str(params, "id"))
        .map(|s| s.to_string());
    let time = params
        .get("time")
        .or_else(|| raw.get("time"))
        .and_then(|v| v.as_u64())
        .unwrap_or(received_at_ms);

    let method_ref = method.as_deref().unwrap_or("");
    let type_ref = get_str(raw, "type").unwrap_or("");
    let tag = if method_ref.is_empty() { type_ref } else { method_ref };
    let is_delta = tag.ends_with("_delta") || tag.ends_with("/delta") || tag.ends_with("Delta");

    let (kind, title) = if tag.contains("reasoning") || tag.contains("thinking") {
        (AppServerEventKind::Thinking, "Thinking".to_string())
    } else if tag.contains("exec") || tag.contains("command") || tag.contains("shell") {
        let cmd = get_str(params, "command").unwrap_or_default();
        (
            AppServerEventKind::Command,
            if cmd.is_empty() {
                "Command".to_string()
            } else {
                truncated(cmd, 80)
            },
        )
    } else if tag.contains("patch") || tag.contains("file_change") || tag.contains("edit") {
        let path = get_str(params, "path").unwrap_or_default();
        (
            AppServerEventKind::FileEdit,
            if path.is_empty() {
                "File edit".to_string()
            } else {
                path.to_string()
            },
        )
    } else if tag.contains("tool") || tag.contains("mcp") {
        let tool = get_str(params, "tool")
            .or_else(|| get_str(params, "name"))
            .unwrap_or("tool");
        (AppServerEventKind::ToolCall, tool.to_string())
    } else if tag.contains("message") || tag.contains("agent_text") {
        (AppServerEventKind::Message, "Message".to_string())
    } else {
        (AppServerEventKind::Unknown, tag.to_string())
    };

    let text = text_of(params);
    let merge_strategy = if is_delta && item_id.is_some() {
        MergeStrategy::Append
    } else if kind == AppServerEventKind::Message {
        MergeStrategy::Newline
    } else {
        MergeStrategy::None
    };

    AppServerEvent {
        raw: if kind == AppServerEventKind::Unknown {
            Some(raw.clone())
        } else {
            None
        },
        kind,
        item_id,
        title,
        summary: truncated(&text, 200),
        detail: if text.is_empty() { None } else { Some(text) },
        method,
        time,
        merge_strategy,
    }
}

#[cfg(test)]
#[path = "app_server_tests.rs"]
mod tests;
