// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow runtime: run lifecycle and worker scheduling.
//!
//! One worker task per active run, single-threaded over that run's state.
//! Bootstrap holds a lock across the active-run check and run creation so
//! concurrent bootstraps for the same repo yield exactly one new run.

use crate::bus::EventBus;
use crate::engine::{run_engine, EngineCtx, RunControl};
use crate::error::FlowError;
use crate::ring::{LiveRing, RingSnapshot};
use car_core::{
    Clock, Destination, FlowEvent, FlowRun, FlowStatus, FlowType, HandoffDispatch, RepoId, RunId,
};
use car_storage::{HubStore, RepoStore};
use car_supervisor::AgentSessions;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Hint returned when bootstrap finds an active run.
pub const ACTIVE_RUN_REUSED: &str = "active_run_reused";

/// Tunables for the flow runtime.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Max turns a single ticket may consume in one run.
    pub turn_cap: u32,
    /// Hard deadline between a stop request and a terminal status.
    pub stop_timeout: Duration,
    /// Event bus queue capacity per subscriber.
    pub subscriber_capacity: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            turn_cap: 20,
            stop_timeout: Duration::from_secs(30),
            subscriber_capacity: crate::bus::DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

/// Result of a bootstrap call.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub run: FlowRun,
    /// `Some(ACTIVE_RUN_REUSED)` when an existing active run was returned.
    pub hint: Option<&'static str>,
}

struct WorkerHandle {
    control_tx: mpsc::Sender<RunControl>,
    ring: Arc<Mutex<LiveRing>>,
    join: tokio::task::JoinHandle<()>,
}

struct Inner<S: AgentSessions, C: Clock> {
    hub: HubStore,
    bus: EventBus,
    sessions: S,
    clock: C,
    config: FlowConfig,
    /// Serializes the active-run check with run creation.
    bootstrap_lock: Mutex<()>,
    workers: Mutex<HashMap<RunId, WorkerHandle>>,
}

/// The flow runtime.
pub struct FlowRuntime<S: AgentSessions, C: Clock> {
    inner: Arc<Inner<S, C>>,
}

impl<S: AgentSessions, C: Clock> Clone for FlowRuntime<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AgentSessions, C: Clock> FlowRuntime<S, C> {
    pub fn new(hub: HubStore, bus: EventBus, sessions: S, clock: C, config: FlowConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                hub,
                bus,
                sessions,
                clock,
                config,
                bootstrap_lock: Mutex::new(()),
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Resolve a repo id to its store, base path, and destination.
    fn repo_for(&self, repo_id: &RepoId) -> Result<(RepoStore, PathBuf, Destination), FlowError> {
        let manifest = self.inner.hub.load_manifest()?;
        let entry = manifest
            .get(repo_id)
            .ok_or_else(|| FlowError::NotFound(format!("repo {}", repo_id)))?;
        let destination = manifest.resolve_destination(repo_id);
        Ok((
            self.inner.hub.repo_store(&entry.path),
            entry.path.clone(),
            destination,
        ))
    }

    /// Start a ticket flow for a repo, or return the active run.
    pub fn bootstrap(&self, repo_id: &RepoId) -> Result<BootstrapOutcome, FlowError> {
        let (repo, repo_path, destination) = self.repo_for(repo_id)?;

        let _guard = self.inner.bootstrap_lock.lock();
        if let Some(active) = repo.find_active_run(FlowType::TicketFlow)? {
            // Re-adopt a run that lost its worker (daemon restart).
            if matches!(active.status, FlowStatus::Pending | FlowStatus::Running)
                && !self.inner.workers.lock().contains_key(&active.run_id)
            {
                self.spawn_worker(&active, repo, repo_path, destination, true);
            }
            return Ok(BootstrapOutcome {
                run: active,
                hint: Some(ACTIVE_RUN_REUSED),
            });
        }

        let tickets = repo.discover_tickets()?;
        if tickets.tickets.is_empty() {
            return Err(FlowError::PreconditionFailed(format!(
                "no tickets for repo {}",
                repo_id
            )));
        }

        let epoch_ms = self.inner.clock.epoch_ms();
        let run = FlowRun::new(
            RunId::generate(epoch_ms),
            FlowType::TicketFlow,
            repo_id.clone(),
            epoch_ms,
        );
        repo.save_run(&run)?;
        info!(run = %run.run_id, repo = %repo_id, "flow run created");
        self.spawn_worker(&run, repo, repo_path, destination, false);
        Ok(BootstrapOutcome { run, hint: None })
    }

    fn spawn_worker(
        &self,
        run: &FlowRun,
        repo: RepoStore,
        repo_path: PathBuf,
        destination: Destination,
        resuming: bool,
    ) {
        let (control_tx, control_rx) = mpsc::channel(8);
        let ring = Arc::new(Mutex::new(LiveRing::new()));
        let ctx = EngineCtx {
            repo_id: run.repo_id.clone(),
            repo_path,
            repo,
            run_id: run.run_id.clone(),
            destination,
            bus: self.inner.bus.clone(),
            sessions: self.inner.sessions.clone(),
            clock: self.inner.clock.clone(),
            config: self.inner.config.clone(),
            ring: Arc::clone(&ring),
            control_rx,
            resuming,
        };
        let inner = Arc::clone(&self.inner);
        let run_id = run.run_id.clone();
        let join = tokio::spawn({
            let run_id = run_id.clone();
            async move {
                run_engine(ctx).await;
                inner.workers.lock().remove(&run_id);
            }
        });
        self.inner.workers.lock().insert(
            run_id,
            WorkerHandle {
                control_tx,
                ring,
                join,
            },
        );
    }

    /// Resume a paused run. Only valid from `paused`.
    pub async fn resume(&self, repo_id: &RepoId, run_id: &RunId) -> Result<(), FlowError> {
        let (repo, repo_path, destination) = self.repo_for(repo_id)?;
        let run = repo.load_run(run_id)?;
        if run.status != FlowStatus::Paused {
            return Err(FlowError::InvalidTransition {
                status: run.status.to_string(),
                action: "resume".to_string(),
            });
        }

        let control_tx = {
            let workers = self.inner.workers.lock();
            workers.get(run_id).map(|w| w.control_tx.clone())
        };
        match control_tx {
            Some(control_tx) => {
                control_tx
                    .send(RunControl::Resume)
                    .await
                    .map_err(|_| FlowError::NotFound(format!("worker for run {}", run_id)))?;
            }
            None => {
                // Paused run without a worker (daemon restart): restart the
                // engine in resume mode.
                self.spawn_worker(&run, repo, repo_path, destination, true);
            }
        }
        Ok(())
    }

    /// Request cooperative shutdown of a run.
    ///
    /// Returns immediately; a watchdog escalates to `failed` with reason
    /// `stop_timeout` if the run does not reach a terminal status in time.
    pub async fn stop(&self, repo_id: &RepoId, run_id: &RunId) -> Result<(), FlowError> {
        let (repo, _repo_path, _destination) = self.repo_for(repo_id)?;
        let mut run = repo.load_run(run_id)?;
        if !matches!(
            run.status,
            FlowStatus::Pending | FlowStatus::Running | FlowStatus::Paused
        ) {
            return Err(FlowError::InvalidTransition {
                status: run.status.to_string(),
                action: "stop".to_string(),
            });
        }

        run.status = FlowStatus::Stopping;
        repo.save_run(&run)?;

        let control_tx = {
            let workers = self.inner.workers.lock();
            workers.get(run_id).map(|w| w.control_tx.clone())
        };
        let Some(control_tx) = control_tx else {
            // No worker: finalize directly.
            let now = self.inner.clock.epoch_ms();
            run.finish(FlowStatus::Stopped, now);
            repo.save_run(&run)?;
            self.inner.bus.publish(&FlowEvent::FlowStopped {
                run_id: run_id.clone(),
                timestamp: now,
            });
            self.inner.bus.close_run(run_id, now);
            return Ok(());
        };
        let _ = control_tx.send(RunControl::Stop).await;

        // Watchdog: hard deadline for the cooperative path.
        let runtime = self.clone();
        let repo_id = repo_id.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(runtime.inner.config.stop_timeout).await;
            runtime.enforce_stop_deadline(&repo_id, &run_id);
        });
        Ok(())
    }

    fn enforce_stop_deadline(&self, repo_id: &RepoId, run_id: &RunId) {
        let Ok((repo, _, _)) = self.repo_for(repo_id) else {
            return;
        };
        let Ok(mut run) = repo.load_run(run_id) else {
            return;
        };
        if run.is_terminal() {
            return;
        }
        warn!(run = %run_id, "stop deadline exceeded, forcing failed");
        if let Some(worker) = self.inner.workers.lock().remove(run_id) {
            worker.join.abort();
        }
        let now = self.inner.clock.epoch_ms();
        run.ticket_engine_mut().reason = Some("stop_timeout".to_string());
        run.finish(FlowStatus::Failed, now);
        if let Err(e) = repo.save_run(&run) {
            warn!(run = %run_id, error = %e, "cannot persist stop_timeout");
        }
        self.inner.bus.publish(&FlowEvent::FlowFailed {
            run_id: run_id.clone(),
            timestamp: now,
            reason: "stop_timeout".to_string(),
        });
        self.inner.bus.close_run(run_id, now);
    }

    /// Archive a run's tickets. Only valid from a terminal status, or from
    /// `paused`/`stopping` with `force`.
    pub fn archive(
        &self,
        repo_id: &RepoId,
        run_id: &RunId,
        force: bool,
    ) -> Result<usize, FlowError> {
        let (repo, _, _) = self.repo_for(repo_id)?;
        let mut run = repo.load_run(run_id)?;
        let allowed = run.is_terminal()
            || (force && matches!(run.status, FlowStatus::Paused | FlowStatus::Stopping));
        if !allowed {
            return Err(FlowError::InvalidTransition {
                status: run.status.to_string(),
                action: "archive".to_string(),
            });
        }
        let moved = repo.archive_tickets(run_id)?;
        run.archived = true;
        repo.save_run(&run)?;
        self.inner.bus.publish(&FlowEvent::FlowArchived {
            run_id: run_id.clone(),
            timestamp: self.inner.clock.epoch_ms(),
        });
        Ok(moved)
    }

    // -- queries --

    pub fn list_runs(&self, repo_id: &RepoId) -> Result<Vec<FlowRun>, FlowError> {
        let (repo, _, _) = self.repo_for(repo_id)?;
        Ok(repo.list_runs(FlowType::TicketFlow)?)
    }

    pub fn get_run(&self, repo_id: &RepoId, run_id: &RunId) -> Result<FlowRun, FlowError> {
        let (repo, _, _) = self.repo_for(repo_id)?;
        Ok(repo.load_run(run_id)?)
    }

    pub fn handoff_history(
        &self,
        repo_id: &RepoId,
        run_id: &RunId,
    ) -> Result<Vec<HandoffDispatch>, FlowError> {
        let (repo, _, _) = self.repo_for(repo_id)?;
        Ok(repo.list_handoffs(run_id)?)
    }

    /// Tail of the live output ring for an active run.
    pub fn live_output(&self, run_id: &RunId) -> Option<RingSnapshot> {
        let workers = self.inner.workers.lock();
        workers.get(run_id).map(|w| w.ring.lock().snapshot())
    }

    /// Subscribe to a run's event stream.
    pub fn subscribe(&self, run_id: &RunId) -> crate::bus::Subscription {
        self.inner
            .bus
            .subscribe(Some(run_id), self.inner.config.subscriber_capacity)
    }

    /// True while a worker task exists for the run.
    pub fn has_worker(&self, run_id: &RunId) -> bool {
        self.inner.workers.lock().contains_key(run_id)
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
