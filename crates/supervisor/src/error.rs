// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from supervisor operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    /// Destination preflight failed. Never falls back to local silently;
    /// the flow run fails with this reason.
    #[error("destination unavailable: {0}")]
    DestinationUnavailable(String),

    /// Unexpected framing from an agent process.
    #[error("agent protocol error: {0}")]
    Protocol(String),

    #[error("session worker exited")]
    WorkerGone,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
