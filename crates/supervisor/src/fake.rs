// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake supervisor for other crates' tests.

use crate::app_server::SessionKey;
use crate::error::SupervisorError;
use crate::protocol::{SessionEvent, TurnOutcome, TurnRequest};
use crate::registry::{AgentSessions, SessionInfo, SessionState};
use async_trait::async_trait;
use car_core::SessionId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// How a scripted turn behaves.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Resolve immediately with the outcome.
    Resolve(TurnOutcome),
    /// Block until `interrupt()`, then resolve `Interrupted`.
    WaitForInterrupt,
    /// Never resolve, even when interrupted (an agent ignoring cancel).
    Hang,
}

/// One scripted turn.
#[derive(Debug, Clone)]
pub struct FakeTurn {
    pub events: Vec<SessionEvent>,
    pub behavior: FakeBehavior,
}

impl FakeTurn {
    pub fn done(reply: serde_json::Value) -> Self {
        Self {
            events: Vec::new(),
            behavior: FakeBehavior::Resolve(TurnOutcome::Done { reply }),
        }
    }

    pub fn error(reason: &str) -> Self {
        Self {
            events: Vec::new(),
            behavior: FakeBehavior::Resolve(TurnOutcome::error(reason)),
        }
    }

    pub fn with_events(mut self, events: Vec<SessionEvent>) -> Self {
        self.events = events;
        self
    }
}

/// A recorded submit call.
#[derive(Debug, Clone)]
pub struct SubmittedTurn {
    pub session_id: SessionId,
    pub req: TurnRequest,
}

#[derive(Default)]
struct FakeInner {
    script: VecDeque<FakeTurn>,
    submitted: Vec<SubmittedTurn>,
    opened: Vec<SessionKey>,
    interrupts: Vec<SessionId>,
    closed: Vec<SessionId>,
    fail_open: Option<String>,
}

/// Scripted [`AgentSessions`] implementation.
#[derive(Clone, Default)]
pub struct FakeSessions {
    inner: Arc<Mutex<FakeInner>>,
    interrupt_signal: Arc<Notify>,
}

impl FakeSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next turn's behavior. Turns are consumed in FIFO order.
    pub fn push_turn(&self, turn: FakeTurn) {
        self.inner.lock().script.push_back(turn);
    }

    /// Make every `open_session` fail (e.g. destination unavailable).
    pub fn fail_open(&self, reason: &str) {
        self.inner.lock().fail_open = Some(reason.to_string());
    }

    pub fn submitted(&self) -> Vec<SubmittedTurn> {
        self.inner.lock().submitted.clone()
    }

    pub fn opened(&self) -> Vec<SessionKey> {
        self.inner.lock().opened.clone()
    }

    pub fn interrupts(&self) -> Vec<SessionId> {
        self.inner.lock().interrupts.clone()
    }

    pub fn closed(&self) -> Vec<SessionId> {
        self.inner.lock().closed.clone()
    }
}

#[async_trait]
impl AgentSessions for FakeSessions {
    async fn open_session(&self, key: &SessionKey) -> Result<SessionId, SupervisorError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.fail_open {
            return Err(SupervisorError::DestinationUnavailable(reason.clone()));
        }
        inner.opened.push(key.clone());
        Ok(SessionId::new(format!("fake-{}", key.thread_key)))
    }

    async fn submit_turn(
        &self,
        session_id: &SessionId,
        req: TurnRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<TurnOutcome, SupervisorError> {
        let turn = {
            let mut inner = self.inner.lock();
            inner.submitted.push(SubmittedTurn {
                session_id: session_id.clone(),
                req,
            });
            inner.script.pop_front()
        };
        let turn = turn.unwrap_or_else(|| FakeTurn::done(serde_json::Value::Null));

        for event in turn.events {
            let _ = events.send(event).await;
        }
        match turn.behavior {
            FakeBehavior::Resolve(outcome) => Ok(outcome),
            FakeBehavior::WaitForInterrupt => {
                self.interrupt_signal.notified().await;
                Ok(TurnOutcome::Interrupted)
            }
            FakeBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn interrupt(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        self.inner.lock().interrupts.push(session_id.clone());
        self.interrupt_signal.notify_waiters();
        Ok(())
    }

    async fn close_session(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        self.inner.lock().closed.push(session_id.clone());
        Ok(())
    }

    fn list_sessions(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock();
        inner
            .opened
            .iter()
            .map(|key| SessionInfo {
                session_id: SessionId::new(format!("fake-{}", key.thread_key)),
                kind: "app_server".to_string(),
                repo_id: key.repo_id.clone(),
                agent: key.agent,
                started_at_ms: 0,
                state: SessionState::Idle,
            })
            .collect()
    }
}
