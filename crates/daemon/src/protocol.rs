// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. A
//! `Subscribe` request flips the connection into a stream of
//! length-prefixed [`car_core::FlowEvent`] frames.

use car_core::{Destination, FlowEvent, FlowRun, HandoffDispatch, RepoId, RunId};
use car_delivery::DeliveryOutcome;
use car_storage::RepoEntry;
use car_supervisor::SessionInfo;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Maximum message size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default IPC timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Start a ticket flow (or reuse the active run)
    Bootstrap { repo_id: RepoId },

    /// Resume a paused run
    Resume { repo_id: RepoId, run_id: RunId },

    /// Request cooperative shutdown of a run
    Stop { repo_id: RepoId, run_id: RunId },

    /// Archive a run's tickets
    Archive {
        repo_id: RepoId,
        run_id: RunId,
        #[serde(default)]
        force: bool,
    },

    /// List runs, newest first
    Runs { repo_id: RepoId },

    /// One run record
    Run { repo_id: RepoId, run_id: RunId },

    /// Handoff history for a run
    HandoffHistory { repo_id: RepoId, run_id: RunId },

    /// Tail of a running flow's live output
    LiveOutput { run_id: RunId },

    /// Switch this connection to an event stream for a run
    Subscribe { run_id: RunId },

    /// Deliver a PMA output or dispatch to all targets
    PmaDeliver {
        id: String,
        text: String,
        #[serde(default)]
        is_dispatch: bool,
    },

    /// List configured delivery targets
    TargetsList,

    /// Add a delivery target by ref (e.g. `chat:telegram:123`)
    TargetsAdd { target_ref: String },

    /// Remove a delivery target by ref
    TargetsRemove { target_ref: String },

    /// Remove every delivery target
    TargetsClear,

    /// Show a repo's effective destination
    DestinationShow { repo_id: RepoId },

    /// Set (or clear) a repo's destination
    DestinationSet {
        repo_id: RepoId,
        destination: Option<Destination>,
    },

    /// Add or update a repo in the manifest
    RepoUpsert { repo_id: RepoId, entry: RepoEntry },

    /// Remove a repo from the manifest
    RepoRemove { repo_id: RepoId },

    /// List live agent sessions
    Sessions,

    /// List PMA dispatch files, newest first
    Dispatches,

    /// Mark a dispatch resolved
    DispatchResolve { stem: String },

    /// Open (or reattach to) a PTY terminal; byte frames follow
    TerminalOpen {
        repo_id: RepoId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<car_core::SessionId>,
        /// Close this session before spawning the new one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        close_old: Option<car_core::SessionId>,
        rows: u16,
        cols: u16,
    },

    /// Write client keystrokes to a terminal
    TerminalInput {
        session_id: car_core::SessionId,
        bytes: Vec<u8>,
    },

    /// Resize a terminal
    TerminalResize {
        session_id: car_core::SessionId,
        rows: u16,
        cols: u16,
    },

    /// Close a terminal
    TerminalClose { session_id: car_core::SessionId },

    /// Request daemon shutdown
    Shutdown,
}

/// Response from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Pong,

    Hello { version: String },

    Ok,

    /// Structured failure: `detail` is human-readable, `error` a stable tag.
    Error {
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Bootstrapped {
        run: FlowRun,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },

    Runs { runs: Vec<FlowRun> },

    Run { run: FlowRun },

    Handoffs { handoffs: Vec<HandoffDispatch> },

    LiveOutput {
        lines: Vec<String>,
        events: Vec<car_core::AppServerEvent>,
    },

    /// Acknowledged; FlowEvent frames follow on this connection.
    Subscribed,

    Delivered { outcome: DeliveryOutcome },

    Targets {
        targets: Vec<String>,
        last_delivery_by_target: BTreeMap<String, String>,
    },

    Destination { destination: Destination },

    Archived { moved: usize },

    Sessions { sessions: Vec<SessionInfo> },

    Dispatches { dispatches: Vec<DispatchSummary> },

    /// Terminal attached; raw output byte frames follow on this connection.
    TerminalOpened {
        session_id: car_core::SessionId,
        replay: Vec<u8>,
    },

    ShuttingDown,
}

/// Wire form of one dispatch file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSummary {
    pub id: String,
    pub title: String,
    pub priority: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl Response {
    pub fn error(detail: impl Into<String>, tag: Option<&str>) -> Self {
        Response::Error {
            detail: detail.into(),
            error: tag.map(|t| t.to_string()),
        }
    }
}

/// Encode a message to JSON bytes (without length prefix)
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

/// Decode a message from wire format
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed message from an async reader
pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a length-prefixed message to an async writer
pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with timeout
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with timeout
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Write one event frame on a subscribed connection.
pub async fn write_event<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    event: &FlowEvent,
) -> Result<(), ProtocolError> {
    let data = encode(event)?;
    write_message(writer, &data).await
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
