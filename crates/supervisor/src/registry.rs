// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry types and the supervisor capability trait.

use crate::app_server::SessionKey;
use crate::error::SupervisorError;
use crate::protocol::{SessionEvent, TurnOutcome, TurnRequest};
use async_trait::async_trait;
use car_core::{Agent, RepoId, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle state of one agent process.
///
/// Transitions are linear and single-threaded per session:
/// `starting → idle ↔ busy → interrupting → … → exiting → dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Idle,
    Busy,
    Interrupting,
    Exiting,
    Dead,
}

/// Registry view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    /// "app_server" or "pty".
    pub kind: String,
    pub repo_id: RepoId,
    pub agent: Agent,
    pub started_at_ms: u64,
    pub state: SessionState,
}

/// The capability flow runs consume: open/reuse sessions, run turns,
/// interrupt. Implemented by [`crate::AppServerSupervisor`] for real agent
/// processes and by `FakeSessions` in tests.
#[async_trait]
pub trait AgentSessions: Clone + Send + Sync + 'static {
    /// Open a session for the key, or reuse the live one with the same
    /// thread key.
    async fn open_session(&self, key: &SessionKey) -> Result<SessionId, SupervisorError>;

    /// Run one turn. Exactly one turn is in flight per session; extra
    /// submissions queue in FIFO order. Streamed events go to `events`.
    async fn submit_turn(
        &self,
        session_id: &SessionId,
        req: TurnRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<TurnOutcome, SupervisorError>;

    /// Cancel the in-flight turn, if any. Idempotent; a no-op while idle.
    async fn interrupt(&self, session_id: &SessionId) -> Result<(), SupervisorError>;

    /// Shut the session's process down.
    async fn close_session(&self, session_id: &SessionId) -> Result<(), SupervisorError>;

    fn list_sessions(&self) -> Vec<SessionInfo>;
}
