// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App-server session supervision.
//!
//! One child process per logical session, one worker task per child. The
//! worker owns all process I/O; callers talk to it over a command channel.
//! Turns are strictly sequential per session: a submit while busy queues
//! behind the in-flight turn.

use crate::destination::{DestinationExecutor, LaunchSpec};
use crate::error::SupervisorError;
use crate::protocol::{
    encode_interrupt, encode_submit, parse_event_line, EventLine, SessionEvent, TurnOutcome,
    TurnRequest,
};
use crate::registry::{AgentSessions, SessionInfo, SessionState};
use async_trait::async_trait;
use car_core::{Agent, Clock, Destination, RepoId, SessionId, SystemClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default per-turn soft budget.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(600);

/// Identity of a logical session. Sessions are reused by `thread_key`
/// (e.g. `ticket_flow.<repo>`), so consecutive turns share agent context.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionKey {
    pub repo_id: RepoId,
    pub thread_key: String,
    pub agent: Agent,
    pub workdir: PathBuf,
    pub destination: Destination,
}

enum SessionCommand {
    Submit {
        req: TurnRequest,
        events: mpsc::Sender<SessionEvent>,
        done: oneshot::Sender<TurnOutcome>,
    },
    Interrupt,
    Shutdown,
}

struct SessionHandle {
    info: SessionInfo,
    state: Arc<Mutex<SessionState>>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    thread_key: String,
}

struct Inner {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    by_thread: Mutex<HashMap<String, SessionId>>,
    turn_timeout: Duration,
}

/// Supervisor for app-server sessions.
#[derive(Clone)]
pub struct AppServerSupervisor {
    inner: Arc<Inner>,
    clock: SystemClock,
}

impl AppServerSupervisor {
    pub fn new() -> Self {
        Self::with_turn_timeout(DEFAULT_TURN_TIMEOUT)
    }

    pub fn with_turn_timeout(turn_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                by_thread: Mutex::new(HashMap::new()),
                turn_timeout,
            }),
            clock: SystemClock,
        }
    }

    fn live_session_for(&self, thread_key: &str) -> Option<SessionId> {
        let by_thread = self.inner.by_thread.lock();
        let session_id = by_thread.get(thread_key)?;
        let sessions = self.inner.sessions.lock();
        let handle = sessions.get(session_id)?;
        if *handle.state.lock() == SessionState::Dead {
            return None;
        }
        Some(session_id.clone())
    }

    async fn spawn_session(&self, key: &SessionKey) -> Result<SessionId, SupervisorError> {
        let executor = DestinationExecutor::new(key.destination.clone());
        executor.preflight().await?;

        let spec = LaunchSpec::new(key.agent.binary(), key.workdir.clone())
            .args(key.agent.app_server_args().iter().copied());
        let mut cmd = executor.command(&spec);
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed(format!("{}: {}", key.agent, e)))?;

        let session_id = SessionId::new(format!("as-{}", uuid::Uuid::new_v4().simple()));
        let state = Arc::new(Mutex::new(SessionState::Starting));
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        // Drain stderr at debug level; it is diagnostics, not protocol.
        if let Some(stderr) = child.stderr.take() {
            let id = session_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(session = %id, "agent stderr: {}", line);
                }
            });
        }

        let handle = SessionHandle {
            info: SessionInfo {
                session_id: session_id.clone(),
                kind: "app_server".to_string(),
                repo_id: key.repo_id.clone(),
                agent: key.agent,
                started_at_ms: self.clock.epoch_ms(),
                state: SessionState::Starting,
            },
            state: Arc::clone(&state),
            cmd_tx,
            thread_key: key.thread_key.clone(),
        };

        {
            let worker_state = Arc::clone(&state);
            let id = session_id.clone();
            let timeout = self.inner.turn_timeout;
            tokio::spawn(async move {
                session_worker(id, child, cmd_rx, worker_state, timeout).await;
            });
        }

        self.inner
            .sessions
            .lock()
            .insert(session_id.clone(), handle);
        self.inner
            .by_thread
            .lock()
            .insert(key.thread_key.clone(), session_id.clone());
        Ok(session_id)
    }

    fn cmd_tx(&self, session_id: &SessionId) -> Result<mpsc::Sender<SessionCommand>, SupervisorError> {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .map(|h| h.cmd_tx.clone())
            .ok_or_else(|| SupervisorError::NotFound(session_id.to_string()))
    }
}

impl Default for AppServerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentSessions for AppServerSupervisor {
    async fn open_session(&self, key: &SessionKey) -> Result<SessionId, SupervisorError> {
        if let Some(session_id) = self.live_session_for(&key.thread_key) {
            return Ok(session_id);
        }
        self.spawn_session(key).await
    }

    async fn submit_turn(
        &self,
        session_id: &SessionId,
        req: TurnRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<TurnOutcome, SupervisorError> {
        let cmd_tx = self.cmd_tx(session_id)?;
        let (done_tx, done_rx) = oneshot::channel();
        cmd_tx
            .send(SessionCommand::Submit {
                req,
                events,
                done: done_tx,
            })
            .await
            .map_err(|_| SupervisorError::WorkerGone)?;
        done_rx.await.map_err(|_| SupervisorError::WorkerGone)
    }

    async fn interrupt(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        let cmd_tx = self.cmd_tx(session_id)?;
        // Idempotent: the worker ignores interrupts while idle. A dead
        // worker means there is nothing left to interrupt.
        let _ = cmd_tx.send(SessionCommand::Interrupt).await;
        Ok(())
    }

    async fn close_session(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        let handle = {
            let mut sessions = self.inner.sessions.lock();
            sessions.remove(session_id)
        };
        let Some(handle) = handle else {
            return Err(SupervisorError::NotFound(session_id.to_string()));
        };
        self.inner.by_thread.lock().remove(&handle.thread_key);
        let _ = handle.cmd_tx.send(SessionCommand::Shutdown).await;
        Ok(())
    }

    fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions.lock();
        sessions
            .values()
            .map(|h| {
                let mut info = h.info.clone();
                info.state = *h.state.lock();
                info
            })
            .collect()
    }
}

struct ActiveTurn {
    events: mpsc::Sender<SessionEvent>,
    done: oneshot::Sender<TurnOutcome>,
    deadline: tokio::time::Instant,
}

struct PendingTurn {
    req: TurnRequest,
    events: mpsc::Sender<SessionEvent>,
    done: oneshot::Sender<TurnOutcome>,
}

/// The single task that owns one child process.
async fn session_worker(
    session_id: SessionId,
    mut child: Child,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    state: Arc<Mutex<SessionState>>,
    turn_timeout: Duration,
) {
    let Some(stdout) = child.stdout.take() else {
        warn!(session = %session_id, "child has no stdout, marking dead");
        *state.lock() = SessionState::Dead;
        return;
    };
    let mut stdin = child.stdin.take();
    let mut lines = BufReader::new(stdout).lines();
    let mut queue: VecDeque<PendingTurn> = VecDeque::new();
    let mut current: Option<ActiveTurn> = None;

    *state.lock() = SessionState::Idle;

    loop {
        let deadline = current.as_ref().map(|t| t.deadline);
        tokio::select! {
            command = cmd_rx.recv() => {
                match command {
                    Some(SessionCommand::Submit { req, events, done }) => {
                        if current.is_some() {
                            queue.push_back(PendingTurn { req, events, done });
                            continue;
                        }
                        current = start_turn(&session_id, &mut stdin, req, events, done, turn_timeout).await;
                        if current.is_some() {
                            *state.lock() = SessionState::Busy;
                        }
                    }
                    Some(SessionCommand::Interrupt) => {
                        // No-op while idle.
                        if current.is_some() && *state.lock() == SessionState::Busy {
                            *state.lock() = SessionState::Interrupting;
                            send_line(&mut stdin, &encode_interrupt()).await;
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        *state.lock() = SessionState::Exiting;
                        if let Some(turn) = current.take() {
                            let _ = turn.done.send(TurnOutcome::Interrupted);
                        }
                        for pending in queue.drain(..) {
                            let _ = pending.done.send(TurnOutcome::Interrupted);
                        }
                        if let Err(e) = child.kill().await {
                            debug!(session = %session_id, error = %e, "kill on shutdown");
                        }
                        break;
                    }
                }
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let Some(parsed) = parse_event_line(&line) else { continue };
                        match parsed {
                            Ok(EventLine::Event(event)) => {
                                if let Some(turn) = &current {
                                    let _ = turn.events.send(event).await;
                                }
                            }
                            Ok(EventLine::Done(reply)) => {
                                finish_turn(&mut current, TurnOutcome::Done { reply });
                                advance(&session_id, &state, &mut stdin, &mut queue, &mut current, turn_timeout).await;
                            }
                            Ok(EventLine::Error(message)) => {
                                finish_turn(&mut current, TurnOutcome::error(message));
                                advance(&session_id, &state, &mut stdin, &mut queue, &mut current, turn_timeout).await;
                            }
                            Ok(EventLine::Interrupted) => {
                                finish_turn(&mut current, TurnOutcome::Interrupted);
                                advance(&session_id, &state, &mut stdin, &mut queue, &mut current, turn_timeout).await;
                            }
                            Err(description) => {
                                warn!(session = %session_id, %description, "agent protocol error");
                                finish_turn(
                                    &mut current,
                                    TurnOutcome::error(format!("agent_protocol_error: {}", description)),
                                );
                                advance(&session_id, &state, &mut stdin, &mut queue, &mut current, turn_timeout).await;
                            }
                        }
                    }
                    Ok(None) | Err(_) => {
                        // Unexpected exit mid-turn is an error, never `done`.
                        let exit = child.try_wait().ok().flatten();
                        let reason = match exit {
                            Some(status) => format!("agent exited: {}", status),
                            None => "agent stream closed".to_string(),
                        };
                        finish_turn(&mut current, TurnOutcome::error(reason.clone()));
                        for pending in queue.drain(..) {
                            let _ = pending.done.send(TurnOutcome::error(reason.clone()));
                        }
                        *state.lock() = SessionState::Dead;
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() => {
                warn!(session = %session_id, "turn exceeded soft budget");
                send_line(&mut stdin, &encode_interrupt()).await;
                finish_turn(&mut current, TurnOutcome::error("turn_timeout"));
                advance(&session_id, &state, &mut stdin, &mut queue, &mut current, turn_timeout).await;
            }
        }
    }
}

async fn start_turn(
    session_id: &SessionId,
    stdin: &mut Option<ChildStdin>,
    req: TurnRequest,
    events: mpsc::Sender<SessionEvent>,
    done: oneshot::Sender<TurnOutcome>,
    turn_timeout: Duration,
) -> Option<ActiveTurn> {
    let line = match encode_submit(&req) {
        Ok(line) => line,
        Err(e) => {
            let _ = done.send(TurnOutcome::error(format!("encode failed: {}", e)));
            return None;
        }
    };
    debug!(session = %session_id, turn = %req.client_turn_id, "submitting turn");
    if !send_line(stdin, &line).await {
        let _ = done.send(TurnOutcome::error("agent stdin closed"));
        return None;
    }
    Some(ActiveTurn {
        events,
        done,
        deadline: tokio::time::Instant::now() + turn_timeout,
    })
}

fn finish_turn(current: &mut Option<ActiveTurn>, outcome: TurnOutcome) {
    if let Some(turn) = current.take() {
        let _ = turn.done.send(outcome);
    }
}

/// After a turn resolves: go idle, then start the next queued turn if any.
async fn advance(
    session_id: &SessionId,
    state: &Arc<Mutex<SessionState>>,
    stdin: &mut Option<ChildStdin>,
    queue: &mut VecDeque<PendingTurn>,
    current: &mut Option<ActiveTurn>,
    turn_timeout: Duration,
) {
    *state.lock() = SessionState::Idle;
    while let Some(pending) = queue.pop_front() {
        *current = start_turn(
            session_id,
            stdin,
            pending.req,
            pending.events,
            pending.done,
            turn_timeout,
        )
        .await;
        if current.is_some() {
            *state.lock() = SessionState::Busy;
            return;
        }
        // start_turn resolved the pending turn with an error; try the next.
    }
}

async fn send_line(stdin: &mut Option<ChildStdin>, line: &str) -> bool {
    let Some(writer) = stdin.as_mut() else {
        return false;
    };
    let mut bytes = line.as_bytes().to_vec();
    bytes.push(b'\n');
    match writer.write_all(&bytes).await {
        Ok(()) => writer.flush().await.is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "app_server_tests.rs"]
mod tests;
