// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ticket engine: one cooperative loop per flow run.
//!
//! Each tick picks the lowest-index open ticket, runs one agent turn
//! against the run's session, and applies the structured reply: mark the
//! ticket done, dispatch handoffs, pause, or keep going. Stop requests are
//! honored between turns and — via interrupt — mid-turn.

use crate::bus::EventBus;
use crate::reply::{parse_handoff, parse_reply, HandoffRequest};
use crate::ring::LiveRing;
use crate::runtime::FlowConfig;
use car_core::{
    classify_envelope, Clock, Destination, FlowEvent, FlowStatus, FlowRun, HandoffMode, RepoId,
    RunId, SessionId,
};
use car_storage::RepoStore;
use car_supervisor::{AgentSessions, SessionEvent, SessionKey, SupervisorError, TurnOutcome,
    TurnRequest};
use car_ticket::Ticket;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Control messages for a run worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunControl {
    Resume,
    Stop,
}

pub(crate) struct EngineCtx<S: AgentSessions, C: Clock> {
    pub repo_id: RepoId,
    pub repo_path: PathBuf,
    pub repo: RepoStore,
    pub run_id: RunId,
    pub destination: Destination,
    pub bus: EventBus,
    pub sessions: S,
    pub clock: C,
    pub config: FlowConfig,
    pub ring: Arc<Mutex<LiveRing>>,
    pub control_rx: mpsc::Receiver<RunControl>,
    /// True when this worker continues a paused run.
    pub resuming: bool,
}

enum TickOutcome {
    Continue,
    Finished(FlowStatus, Option<String>),
}

/// Drive one run to a terminal status.
pub(crate) async fn run_engine<S: AgentSessions, C: Clock>(ctx: EngineCtx<S, C>) {
    let EngineCtx {
        repo_id,
        repo_path,
        repo,
        run_id,
        destination,
        bus,
        sessions,
        clock,
        config,
        ring,
        mut control_rx,
        resuming,
    } = ctx;

    let mut run = match repo.load_run(&run_id) {
        Ok(run) => run,
        Err(e) => {
            warn!(run = %run_id, error = %e, "run record unreadable, worker exiting");
            return;
        }
    };

    run.status = FlowStatus::Running;
    if let Err(e) = repo.save_run(&run) {
        warn!(run = %run_id, error = %e, "cannot persist run start");
        return;
    }
    let started = if resuming {
        FlowEvent::FlowResumed {
            run_id: run_id.clone(),
            timestamp: clock.epoch_ms(),
        }
    } else {
        FlowEvent::FlowStarted {
            run_id: run_id.clone(),
            timestamp: clock.epoch_ms(),
        }
    };
    bus.publish(&started);

    let mut stop_requested = false;
    let mut session_id: Option<SessionId> = None;

    let (status, reason) = loop {
        // Stop is checked between turns…
        while let Ok(control) = control_rx.try_recv() {
            if control == RunControl::Stop {
                stop_requested = true;
            }
        }
        if stop_requested {
            break (FlowStatus::Stopped, None);
        }

        let tick = tick(
            &repo_id,
            &repo_path,
            &repo,
            &mut run,
            &destination,
            &bus,
            &sessions,
            &clock,
            &config,
            &ring,
            &mut control_rx,
            &mut session_id,
            &mut stop_requested,
        )
        .await;
        match tick {
            TickOutcome::Continue => continue,
            TickOutcome::Finished(status, reason) => break (status, reason),
        }
    };

    finish(&repo, &bus, &clock, &mut run, status, reason);
}

fn finish(
    repo: &RepoStore,
    bus: &EventBus,
    clock: &impl Clock,
    run: &mut FlowRun,
    status: FlowStatus,
    reason: Option<String>,
) {
    let now = clock.epoch_ms();
    if let Some(reason) = &reason {
        let engine = run.ticket_engine_mut();
        engine.reason = Some(reason.clone());
    }
    run.finish(status, now);
    if let Err(e) = repo.save_run(run) {
        warn!(run = %run.run_id, error = %e, "cannot persist terminal status");
    }
    let event = match status {
        FlowStatus::Completed => FlowEvent::FlowCompleted {
            run_id: run.run_id.clone(),
            timestamp: now,
            reason,
        },
        FlowStatus::Stopped => FlowEvent::FlowStopped {
            run_id: run.run_id.clone(),
            timestamp: now,
        },
        _ => FlowEvent::FlowFailed {
            run_id: run.run_id.clone(),
            timestamp: now,
            reason: reason.unwrap_or_else(|| "internal".to_string()),
        },
    };
    bus.publish(&event);
    bus.close_run(&run.run_id, now);
    info!(run = %run.run_id, status = %status, "flow run finished");
}

#[allow(clippy::too_many_arguments)]
async fn tick<S: AgentSessions, C: Clock>(
    repo_id: &RepoId,
    repo_path: &PathBuf,
    repo: &RepoStore,
    run: &mut FlowRun,
    destination: &Destination,
    bus: &EventBus,
    sessions: &S,
    clock: &C,
    config: &FlowConfig,
    ring: &Arc<Mutex<LiveRing>>,
    control_rx: &mut mpsc::Receiver<RunControl>,
    session_id: &mut Option<SessionId>,
    stop_requested: &mut bool,
) -> TickOutcome {
    let set = match repo.discover_tickets() {
        Ok(set) => set,
        Err(e) => {
            return TickOutcome::Finished(
                FlowStatus::Failed,
                Some(format!("ticket_discovery_failed: {}", e)),
            )
        }
    };

    if !set.malformed.is_empty() {
        let engine = run.ticket_engine_mut();
        engine.reason_details = Some(format!(
            "malformed tickets skipped: {}",
            set.malformed
                .iter()
                .map(|(p, _)| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let excluded: BTreeSet<u64> = run
        .state
        .ticket_engine
        .as_ref()
        .map(|e| e.errored_tickets.keys().copied().collect())
        .unwrap_or_default();
    let Some(ticket) = set.next_open(&|index| excluded.contains(&index)) else {
        let reason = if set.tickets.is_empty() {
            Some("no tickets".to_string())
        } else {
            None
        };
        return TickOutcome::Finished(FlowStatus::Completed, reason);
    };
    let ticket = ticket.clone();

    // Per-ticket bookkeeping.
    let ticket_path = ticket.path.display().to_string();
    {
        let engine = run.ticket_engine_mut();
        if engine.current_ticket.as_deref() != Some(ticket_path.as_str()) {
            engine.current_ticket = Some(ticket_path.clone());
            engine.ticket_turns = 0;
            ring.lock().clear();
        }
        if engine.ticket_turns >= config.turn_cap {
            engine
                .errored_tickets
                .insert(ticket.index, "turn_cap_exceeded".to_string());
            engine.reason = Some("turn_cap_exceeded".to_string());
            warn!(run = %run.run_id, ticket = ticket.index, "turn cap exceeded, skipping ticket");
            if let Err(e) = repo.save_run(run) {
                warn!(run = %run.run_id, error = %e, "cannot persist turn-cap marker");
            }
            return TickOutcome::Continue;
        }
    }

    bus.publish(&FlowEvent::StepStarted {
        run_id: run.run_id.clone(),
        timestamp: clock.epoch_ms(),
        ticket_index: ticket.index,
        ticket_path: ticket_path.clone(),
    });

    // Open or reuse the run's session.
    let sid = match session_id {
        Some(sid) => sid.clone(),
        None => {
            let key = SessionKey {
                repo_id: repo_id.clone(),
                thread_key: format!("ticket_flow.{}", repo_id),
                agent: ticket.front.agent,
                workdir: repo_path.clone(),
                destination: destination.clone(),
            };
            match sessions.open_session(&key).await {
                Ok(sid) => {
                    *session_id = Some(sid.clone());
                    sid
                }
                Err(SupervisorError::DestinationUnavailable(detail)) => {
                    run.ticket_engine_mut().reason_details = Some(detail);
                    return TickOutcome::Finished(
                        FlowStatus::Failed,
                        Some("destination_unavailable".to_string()),
                    );
                }
                Err(e) => {
                    return TickOutcome::Finished(
                        FlowStatus::Failed,
                        Some(format!("session_open_failed: {}", e)),
                    )
                }
            }
        }
    };

    // Run one turn, forwarding streamed events as they arrive.
    let turn_seq = run
        .state
        .ticket_engine
        .as_ref()
        .map(|e| e.total_turns)
        .unwrap_or(0)
        + 1;
    let req = TurnRequest {
        message: compose_prompt(&ticket, run),
        agent: ticket.front.agent,
        model: None,
        reasoning: None,
        client_turn_id: format!("{}:{}:{}", run.run_id, ticket.index, turn_seq),
    };
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let mut pending_handoffs: Vec<HandoffRequest> = Vec::new();

    let outcome = {
        let mut turn = pin!(sessions.submit_turn(&sid, req, event_tx));
        let mut control_closed = false;
        loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                event = event_rx.recv() => {
                    if let Some(event) = event {
                        forward_event(bus, clock, ring, run, ticket.index, event, &mut pending_handoffs);
                    }
                }
                control = control_rx.recv(), if !control_closed => {
                    match control {
                        Some(RunControl::Stop) | None => {
                            // …and mid-turn, via interrupt.
                            *stop_requested = true;
                            control_closed = control.is_none();
                            if let Err(e) = sessions.interrupt(&sid).await {
                                warn!(run = %run.run_id, error = %e, "interrupt failed");
                            }
                        }
                        Some(RunControl::Resume) => {}
                    }
                }
            }
        }
    };
    while let Ok(event) = event_rx.try_recv() {
        forward_event(bus, clock, ring, run, ticket.index, event, &mut pending_handoffs);
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            run.ticket_engine_mut().reason = Some(format!("session_error: {}", e));
            let _ = repo.save_run(run);
            if *stop_requested {
                return TickOutcome::Finished(FlowStatus::Stopped, None);
            }
            return TickOutcome::Continue;
        }
    };

    match outcome {
        TurnOutcome::Interrupted => {
            if *stop_requested {
                TickOutcome::Finished(FlowStatus::Stopped, None)
            } else {
                // Operator-level interrupt without stop: re-run the ticket.
                TickOutcome::Continue
            }
        }
        TurnOutcome::Error { reason } => {
            {
                let engine = run.ticket_engine_mut();
                engine.ticket_turns += 1;
                engine.reason = Some(reason.clone());
                engine.reason_details = Some(format!("ticket {}", ticket.index));
            }
            if let Err(e) = repo.save_run(run) {
                warn!(run = %run.run_id, error = %e, "cannot persist turn error");
            }
            if *stop_requested {
                TickOutcome::Finished(FlowStatus::Stopped, None)
            } else {
                TickOutcome::Continue
            }
        }
        TurnOutcome::Done { reply } => {
            apply_done(
                repo,
                run,
                bus,
                clock,
                &ticket,
                reply,
                pending_handoffs,
                control_rx,
                stop_requested,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn apply_done<C: Clock>(
    repo: &RepoStore,
    run: &mut FlowRun,
    bus: &EventBus,
    clock: &C,
    ticket: &Ticket,
    reply: serde_json::Value,
    pending_handoffs: Vec<HandoffRequest>,
    control_rx: &mut mpsc::Receiver<RunControl>,
    stop_requested: &mut bool,
) -> TickOutcome {
    {
        let engine = run.ticket_engine_mut();
        engine.ticket_turns += 1;
        engine.total_turns += 1;
        engine.reason = None;
        engine.reason_details = None;
    }

    let parsed = parse_reply(&reply);
    if parsed.ticket_complete {
        if let Err(e) = repo.mark_ticket_done(&ticket.path) {
            warn!(run = %run.run_id, ticket = ticket.index, error = %e, "cannot mark ticket done");
            run.ticket_engine_mut().reason = Some(format!("ticket_write_failed: {}", e));
        } else {
            info!(run = %run.run_id, ticket = ticket.index, "ticket complete");
        }
    }

    let mut pause_seq = None;
    for handoff in pending_handoffs.into_iter().chain(parsed.handoff) {
        let created_at = chrono::Utc::now().to_rfc3339();
        match repo.append_handoff(
            &run.run_id,
            handoff.mode,
            handoff.title,
            handoff.body,
            handoff.attachments,
            created_at,
        ) {
            Ok(dispatch) => {
                bus.publish(&FlowEvent::HandoffDispatched {
                    run_id: run.run_id.clone(),
                    timestamp: clock.epoch_ms(),
                    seq: dispatch.seq,
                    mode: dispatch.mode,
                    title: dispatch.title.clone(),
                });
                if dispatch.mode == HandoffMode::Pause {
                    pause_seq = Some(dispatch.seq);
                }
            }
            Err(e) => {
                warn!(run = %run.run_id, error = %e, "cannot persist handoff");
            }
        }
    }

    if let Err(e) = repo.save_run(run) {
        warn!(run = %run.run_id, error = %e, "cannot persist engine state");
    }

    if let Some(seq) = pause_seq {
        run.status = FlowStatus::Paused;
        if let Err(e) = repo.save_run(run) {
            warn!(run = %run.run_id, error = %e, "cannot persist pause");
        }
        bus.publish(&FlowEvent::FlowPaused {
            run_id: run.run_id.clone(),
            timestamp: clock.epoch_ms(),
            handoff_seq: Some(seq),
        });
        // Block until the operator resumes or stops.
        loop {
            match control_rx.recv().await {
                Some(RunControl::Resume) => {
                    run.status = FlowStatus::Running;
                    if let Err(e) = repo.save_run(run) {
                        warn!(run = %run.run_id, error = %e, "cannot persist resume");
                    }
                    bus.publish(&FlowEvent::FlowResumed {
                        run_id: run.run_id.clone(),
                        timestamp: clock.epoch_ms(),
                    });
                    break;
                }
                Some(RunControl::Stop) | None => {
                    *stop_requested = true;
                    return TickOutcome::Finished(FlowStatus::Stopped, None);
                }
            }
        }
    }

    if *stop_requested {
        TickOutcome::Finished(FlowStatus::Stopped, None)
    } else {
        TickOutcome::Continue
    }
}

fn forward_event<C: Clock>(
    bus: &EventBus,
    clock: &C,
    ring: &Arc<Mutex<LiveRing>>,
    run: &FlowRun,
    ticket_index: u64,
    event: SessionEvent,
    pending_handoffs: &mut Vec<HandoffRequest>,
) {
    match event {
        SessionEvent::Token(text) => {
            ring.lock().push_text(&text);
            bus.publish(&FlowEvent::AgentStreamDelta {
                run_id: run.run_id.clone(),
                timestamp: clock.epoch_ms(),
                ticket_index,
                text,
            });
        }
        SessionEvent::AppServer(raw) => {
            // Handoffs may arrive as protocol notifications mid-turn; they
            // are persisted once the turn settles.
            if raw.get("method").and_then(|m| m.as_str()) == Some("handoff") {
                let params = raw.get("params").unwrap_or(&raw);
                if let Some(handoff) = parse_handoff(params) {
                    pending_handoffs.push(handoff);
                }
            }
            let classified = classify_envelope(&raw, clock.epoch_ms());
            ring.lock().push_event(classified.clone());
            bus.publish(&FlowEvent::AppServerEvent {
                run_id: run.run_id.clone(),
                timestamp: clock.epoch_ms(),
                ticket_index,
                event: classified,
            });
        }
        SessionEvent::Status(status) => {
            tracing::debug!(run = %run.run_id, %status, "agent status");
        }
        SessionEvent::TokenUsage(_) | SessionEvent::Update(_) => {}
    }
}

/// Turn prompt: the ticket body plus enough run context for continuity.
fn compose_prompt(ticket: &Ticket, run: &FlowRun) -> String {
    let engine = run.state.ticket_engine.as_ref();
    let mut prompt = String::new();
    if !ticket.front.title.is_empty() {
        prompt.push_str("# ");
        prompt.push_str(&ticket.front.title);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&ticket.body);
    if let Some(engine) = engine {
        if engine.ticket_turns > 0 {
            prompt.push_str(&format!(
                "\n\n(Continuation: turn {} on this ticket.)",
                engine.ticket_turns + 1
            ));
        }
    }
    prompt
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
