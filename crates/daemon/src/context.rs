// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hub context: every long-lived component, built once at startup and
//! injected into request handlers. Lifecycle is process-bounded; there are
//! no module-level singletons.

use car_core::{Destination, RepoId, SystemClock};
use car_delivery::{
    AdapterRegistry, DeliveryOutcome, DeliveryRequest, DeliveryRouter, LocalFileAdapter,
    WebAdapter, WebDelivery,
};
use car_flows::{EventBus, FlowConfig, FlowRuntime};
use car_storage::{HubStore, Manifest, RepoEntry, StoreError};
use car_supervisor::{AppServerSupervisor, PtyMultiplexer};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Shared hub state for all request handlers.
pub struct HubContext {
    pub hub: HubStore,
    pub bus: EventBus,
    pub sessions: AppServerSupervisor,
    pub runtime: FlowRuntime<AppServerSupervisor, SystemClock>,
    pub router: DeliveryRouter,
    pub pty: PtyMultiplexer,
    pub clock: SystemClock,
    pub start_time: Instant,
}

impl HubContext {
    /// Build the full component graph for a hub root.
    pub fn new(hub_root: &Path) -> Arc<Self> {
        let hub = HubStore::new(hub_root);
        let bus = EventBus::new();
        let sessions = AppServerSupervisor::new();
        let runtime = FlowRuntime::new(
            hub.clone(),
            bus.clone(),
            sessions.clone(),
            SystemClock,
            FlowConfig::default(),
        );

        // Web deliveries feed the HTTP/SSE shim; until one attaches they
        // are drained here so the adapter never backs up.
        let (web_tx, web_rx) = mpsc::unbounded_channel();
        spawn_web_drain(web_rx);

        let adapters = AdapterRegistry::new()
            .with_local(Arc::new(LocalFileAdapter::new(hub.clone())))
            .with_web(Arc::new(WebAdapter::new(web_tx)));
        let router = DeliveryRouter::new(hub.clone(), adapters);

        let pty = PtyMultiplexer::new(Some(crate::env::pty_registry_path(hub_root)));

        Arc::new(Self {
            hub,
            bus,
            sessions,
            runtime,
            router,
            pty,
            clock: SystemClock,
            start_time: Instant::now(),
        })
    }

    /// Route a PMA output/dispatch to all configured targets.
    pub async fn deliver(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryOutcome, car_delivery::DeliveryError> {
        use car_core::Clock;
        self.router.deliver(request, self.clock.epoch_ms()).await
    }

    /// Manifest mutation under a load-modify-save cycle.
    pub fn update_manifest<T>(
        &self,
        f: impl FnOnce(&mut Manifest) -> T,
    ) -> Result<T, StoreError> {
        let mut manifest = self.hub.load_manifest()?;
        let result = f(&mut manifest);
        self.hub.save_manifest(&manifest)?;
        Ok(result)
    }

    /// A repo's effective destination (own, base's, or local).
    pub fn resolve_destination(&self, repo_id: &RepoId) -> Result<Destination, StoreError> {
        Ok(self.hub.load_manifest()?.resolve_destination(repo_id))
    }

    /// Persist a dispatch markdown file for a PMA dispatch delivery.
    pub fn write_dispatch_file(&self, dispatch_id: &str, text: &str) -> Result<String, StoreError> {
        use car_core::Clock;
        let title = text.lines().next().unwrap_or("Dispatch").trim();
        let front = car_storage::DispatchFront {
            title: if title.is_empty() { "Dispatch" } else { title }.to_string(),
            priority: car_storage::DispatchPriority::Info,
            created_at: chrono::Utc::now().to_rfc3339(),
            source_turn_id: dispatch_id.to_string(),
            links: Vec::new(),
            resolved_at: None,
        };
        self.hub.write_dispatch(
            &car_core::DispatchId::new(dispatch_id),
            &front,
            text,
            self.clock.epoch_ms(),
        )
    }

    pub fn upsert_repo(&self, repo_id: RepoId, entry: RepoEntry) -> Result<(), StoreError> {
        self.update_manifest(|m| m.upsert(repo_id, entry))
    }

    /// Remove a repo from the manifest. Worktrees additionally get their
    /// checkout and branch removed (best-effort).
    pub async fn remove_repo(&self, repo_id: &RepoId) -> Result<bool, StoreError> {
        let removed = self.update_manifest(|m| m.remove(repo_id))?;
        let Some(entry) = removed else {
            return Ok(false);
        };
        if let (car_storage::RepoKind::Worktree, Some(base_id)) =
            (entry.kind, entry.worktree_of.as_ref())
        {
            let base_path = self
                .hub
                .load_manifest()?
                .get(base_id)
                .map(|base| base.path.clone());
            if let Some(base_path) = base_path {
                remove_worktree(&base_path, &entry.path).await;
            }
        }
        Ok(true)
    }
}

/// Tear down a git worktree and its branch. Every step is best-effort;
/// failures are logged and the manifest entry stays removed.
async fn remove_worktree(base_path: &Path, worktree_path: &Path) {
    use tokio::process::Command;

    let branch = Command::new("git")
        .arg("-C")
        .arg(worktree_path)
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .await
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    let removed = Command::new("git")
        .arg("-C")
        .arg(base_path)
        .args(["worktree", "remove", "--force"])
        .arg(worktree_path)
        .output()
        .await;
    match removed {
        Ok(output) if output.status.success() => {}
        Ok(output) => tracing::warn!(
            worktree = %worktree_path.display(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git worktree remove failed"
        ),
        Err(e) => tracing::warn!(error = %e, "git worktree remove failed to spawn"),
    }

    if let Some(branch) = branch.filter(|b| b != "HEAD" && !b.is_empty()) {
        let deleted = Command::new("git")
            .arg("-C")
            .arg(base_path)
            .args(["branch", "-D"])
            .arg(&branch)
            .output()
            .await;
        if let Ok(output) = deleted {
            if !output.status.success() {
                tracing::debug!(
                    branch = %branch,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "worktree branch not deleted"
                );
            }
        }
    }
}

fn spawn_web_drain(mut rx: mpsc::UnboundedReceiver<WebDelivery>) {
    tokio::spawn(async move {
        while let Some(delivery) = rx.recv().await {
            debug!(outbox = %delivery.outbox_id, "web delivery buffered");
        }
    });
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
