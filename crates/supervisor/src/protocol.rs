// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App-server line protocol.
//!
//! Requests go to the child's stdin as one JSON object per line; the child
//! streams JSON lines back. Unknown lines are a protocol error for the
//! current turn, not a crash.

use car_core::Agent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical turn submitted to an app-server session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    pub agent: Agent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Caller-chosen id echoed back in events, for correlation.
    pub client_turn_id: String,
}

/// Wire form of a request line.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum RequestLine<'a> {
    Submit {
        message: &'a str,
        agent: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<&'a str>,
        client_turn_id: &'a str,
    },
    Interrupt,
}

/// Events streamed while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Free-form status string ("thinking", "running tool", ...).
    Status(String),
    /// A token delta of the agent's answer.
    Token(String),
    /// A raw app-server envelope (classified downstream).
    AppServer(Value),
    /// Cumulative token usage.
    TokenUsage(Value),
    /// A model-side update (plan change, file summary, ...).
    Update(Value),
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The agent finished; `reply` is its structured reply object.
    Done { reply: Value },
    /// The turn failed; `reason` is a structured tag like `turn_timeout`.
    Error { reason: String },
    /// The turn was cancelled by an interrupt. Never surfaced as an error.
    Interrupted,
}

impl TurnOutcome {
    pub fn error(reason: impl Into<String>) -> Self {
        TurnOutcome::Error {
            reason: reason.into(),
        }
    }
}

/// One parsed line from the child's stdout.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EventLine {
    Event(SessionEvent),
    Done(Value),
    Error(String),
    Interrupted,
}

/// Parse one stdout line.
///
/// Returns `None` for blank lines; unparseable or untyped lines are
/// `Some(Err(description))` so the session can resolve the turn with an
/// `AgentProtocolError` reason.
pub(crate) fn parse_event_line(line: &str) -> Option<Result<EventLine, String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => return Some(Err(format!("unparseable event line: {}", e))),
    };
    let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let event = match kind {
        "status" => EventLine::Event(SessionEvent::Status(
            value
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string(),
        )),
        "token" => EventLine::Event(SessionEvent::Token(
            value
                .get("text")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string(),
        )),
        "event" | "app-server" => EventLine::Event(SessionEvent::AppServer(
            value.get("event").cloned().unwrap_or(value.clone()),
        )),
        "token_usage" => EventLine::Event(SessionEvent::TokenUsage(
            value.get("usage").cloned().unwrap_or(Value::Null),
        )),
        "update" => EventLine::Event(SessionEvent::Update(
            value.get("update").cloned().unwrap_or(Value::Null),
        )),
        "done" => EventLine::Done(value.get("reply").cloned().unwrap_or(Value::Null)),
        "error" => EventLine::Error(
            value
                .get("message")
                .and_then(|s| s.as_str())
                .unwrap_or("agent error")
                .to_string(),
        ),
        "interrupted" => EventLine::Interrupted,
        other => return Some(Err(format!("unknown event type: {:?}", other))),
    };
    Some(Ok(event))
}

pub(crate) fn encode_submit(req: &TurnRequest) -> Result<String, serde_json::Error> {
    let line = RequestLine::Submit {
        message: &req.message,
        agent: req.agent.as_str(),
        model: req.model.as_deref(),
        reasoning: req.reasoning.as_deref(),
        client_turn_id: &req.client_turn_id,
    };
    serde_json::to_string(&line)
}

pub(crate) fn encode_interrupt() -> String {
    // Static shape; cannot fail.
    "{\"op\":\"interrupt\"}".to_string()
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
