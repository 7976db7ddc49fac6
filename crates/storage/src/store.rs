// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed store facades over the hub and repo state roots.

use crate::atomic::{read_json, read_yaml, write_json_atomic, write_yaml_atomic};
use crate::channels::{ChannelDirectory, ChannelEntry};
use crate::dispatches::{DispatchFront, DispatchRecord};
use crate::error::StoreError;
use crate::handoffs::{self, NewHandoff};
use crate::manifest::{Manifest, MANIFEST_VERSION};
use crate::mirrors;
use crate::root::StateRoot;
use crate::runs;
use crate::targets::{TargetsFile, TARGETS_FILE_VERSION};
use car_core::{
    DispatchId, FlowRun, FlowType, HandoffDispatch, HandoffMode, MirrorDirection, MirrorRecord,
    RunId,
};
use car_ticket::{discover_tickets, mark_ticket_done, TicketSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Store for hub-level state (`<hub>/.codex-autorunner/`).
#[derive(Debug, Clone)]
pub struct HubStore {
    root: StateRoot,
}

impl HubStore {
    pub fn new(hub_base: impl AsRef<Path>) -> Self {
        Self {
            root: StateRoot::new(hub_base),
        }
    }

    pub fn root(&self) -> &StateRoot {
        &self.root
    }

    /// Store handle for a repo managed by this hub.
    pub fn repo_store(&self, repo_base: impl AsRef<Path>) -> RepoStore {
        RepoStore::new(repo_base)
    }

    // -- manifest --

    /// Load the manifest; a missing file is an empty manifest.
    pub fn load_manifest(&self) -> Result<Manifest, StoreError> {
        let manifest: Manifest =
            read_yaml(&self.root.manifest_path())?.unwrap_or_default();
        Ok(manifest)
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let mut manifest = manifest.clone();
        // Readers upgrade stale versions; writers never write them back.
        manifest.version = MANIFEST_VERSION;
        write_yaml_atomic(&self.root.manifest_path(), &manifest)
    }

    // -- delivery targets --

    /// Load the targets file, coalescing duplicate keys.
    pub fn read_targets(&self) -> Result<TargetsFile, StoreError> {
        let mut targets: TargetsFile =
            read_json(&self.root.targets_path())?.unwrap_or_default();
        targets.coalesce();
        Ok(targets)
    }

    pub fn write_targets(&self, targets: &TargetsFile) -> Result<(), StoreError> {
        let mut targets = targets.clone();
        targets.version = TARGETS_FILE_VERSION;
        targets.coalesce();
        write_json_atomic(&self.root.targets_path(), &targets)
    }

    /// Record a successful delivery for dedupe.
    pub fn record_delivery(&self, target_key: &str, turn_id: &str) -> Result<(), StoreError> {
        let mut targets = self.read_targets()?;
        targets
            .last_delivery_by_target
            .insert(target_key.to_string(), turn_id.to_string());
        self.write_targets(&targets)
    }

    /// Append to the hub-wide deliveries mirror.
    pub fn append_delivery_record<T: serde::Serialize>(
        &self,
        record: &T,
    ) -> Result<(), StoreError> {
        mirrors::append_delivery_record(&self.root, record)
    }

    // -- dispatches --

    /// Write a new dispatch file, returning its id (`<ts>_<id>`).
    ///
    /// The dispatch id flows in from callers' payloads; the stem goes
    /// through state-root containment before any filesystem call.
    pub fn write_dispatch(
        &self,
        dispatch_id: &DispatchId,
        front: &DispatchFront,
        body: &str,
        epoch_ms: u64,
    ) -> Result<String, StoreError> {
        let stem = format!("{}_{}", epoch_ms, dispatch_id);
        let path = self.root.dispatch_path(&stem)?;
        let yaml = serde_yaml::to_string(front)?;
        let mut content = String::with_capacity(yaml.len() + body.len() + 16);
        content.push_str("---\n");
        content.push_str(&yaml);
        content.push_str("---\n\n");
        content.push_str(body);
        if !body.ends_with('\n') {
            content.push('\n');
        }
        crate::atomic::replace_file(&path, content.as_bytes())?;
        Ok(stem)
    }

    /// All dispatches, newest first by file stem (timestamp prefix).
    pub fn list_dispatches(&self) -> Result<Vec<DispatchRecord>, StoreError> {
        let dir = self.root.dispatches_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };
        let mut dispatches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(".md") else {
                continue;
            };
            match read_dispatch_file(&entry.path(), stem) {
                Ok(record) => dispatches.push(record),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "bad dispatch"),
            }
        }
        dispatches.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(dispatches)
    }

    /// Set `resolved_at` on a dispatch. The stem comes from operator
    /// input and is containment-checked before the read-modify-write.
    pub fn resolve_dispatch(&self, stem: &str, resolved_at: &str) -> Result<(), StoreError> {
        let path = self.root.dispatch_path(stem)?;
        let mut record = read_dispatch_file(&path, stem)?;
        record.front.resolved_at = Some(resolved_at.to_string());
        let yaml = serde_yaml::to_string(&record.front)?;
        let mut content = String::new();
        content.push_str("---\n");
        content.push_str(&yaml);
        content.push_str("---\n\n");
        content.push_str(&record.body);
        crate::atomic::replace_file(&path, content.as_bytes())
    }

    // -- channel directory (derived cache) --

    /// Read the channel directory, rebuilding silently when corrupt.
    pub fn read_channel_directory(&self) -> ChannelDirectory {
        let path = self.root.channel_directory_path();
        match read_json::<ChannelDirectory>(&path) {
            Ok(Some(dir)) => dir,
            Ok(None) => ChannelDirectory::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rebuilding channel directory");
                ChannelDirectory::default()
            }
        }
    }

    pub fn record_channel(&self, key: String, entry: ChannelEntry) -> Result<(), StoreError> {
        let mut dir = self.read_channel_directory();
        dir.record(key, entry);
        write_json_atomic(&self.root.channel_directory_path(), &dir)
    }
}

fn read_dispatch_file(path: &Path, stem: &str) -> Result<DispatchRecord, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let rest = content
        .strip_prefix("---\n")
        .ok_or_else(|| StoreError::corrupt(path, "missing frontmatter"))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| StoreError::corrupt(path, "unterminated frontmatter"))?;
    let front: DispatchFront = serde_yaml::from_str(&rest[..end + 1])
        .map_err(|e| StoreError::corrupt(path, e.to_string()))?;
    let body = rest[end + 4..].trim_start_matches('\n').to_string();
    Ok(DispatchRecord {
        id: stem.to_string(),
        front,
        body,
    })
}

/// Store for one repo's state (`<repo>/.codex-autorunner/`).
#[derive(Debug, Clone)]
pub struct RepoStore {
    root: StateRoot,
}

impl RepoStore {
    pub fn new(repo_base: impl AsRef<Path>) -> Self {
        Self {
            root: StateRoot::new(repo_base),
        }
    }

    pub fn root(&self) -> &StateRoot {
        &self.root
    }

    pub fn tickets_dir(&self) -> PathBuf {
        self.root.tickets_dir()
    }

    pub fn app_server_workspaces_dir(&self) -> PathBuf {
        self.root.app_server_workspaces_dir()
    }

    // -- flow runs --

    pub fn save_run(&self, run: &FlowRun) -> Result<(), StoreError> {
        runs::save_run(&self.root, run)
    }

    pub fn load_run(&self, run_id: &RunId) -> Result<FlowRun, StoreError> {
        runs::load_run(&self.root, run_id)
    }

    pub fn list_runs(&self, flow_type: FlowType) -> Result<Vec<FlowRun>, StoreError> {
        runs::list_runs(&self.root, flow_type)
    }

    pub fn find_active_run(&self, flow_type: FlowType) -> Result<Option<FlowRun>, StoreError> {
        runs::find_active_run(&self.root, flow_type)
    }

    // -- handoffs --

    pub fn append_handoff(
        &self,
        run_id: &RunId,
        mode: HandoffMode,
        title: impl Into<String>,
        body: impl Into<String>,
        attachments: Vec<String>,
        created_at: String,
    ) -> Result<HandoffDispatch, StoreError> {
        handoffs::append_handoff(
            &self.root,
            run_id,
            NewHandoff {
                mode,
                title: title.into(),
                body: body.into(),
                attachments,
            },
            created_at,
        )
    }

    pub fn list_handoffs(&self, run_id: &RunId) -> Result<Vec<HandoffDispatch>, StoreError> {
        handoffs::list_handoffs(&self.root, run_id)
    }

    // -- chat mirrors --

    pub fn append_chat_mirror(
        &self,
        run_id: &RunId,
        record: &MirrorRecord,
    ) -> Result<(), StoreError> {
        mirrors::append_chat_mirror(&self.root, run_id, record)
    }

    pub fn read_chat_mirror(
        &self,
        run_id: &RunId,
        direction: MirrorDirection,
    ) -> Result<Vec<MirrorRecord>, StoreError> {
        mirrors::read_chat_mirror(&self.root, run_id, direction)
    }

    // -- tickets --

    pub fn discover_tickets(&self) -> Result<TicketSet, StoreError> {
        Ok(discover_tickets(&self.root.tickets_dir())?)
    }

    pub fn mark_ticket_done(&self, path: &Path) -> Result<(), StoreError> {
        // Tickets live under the state root; refuse anything else.
        if !path.starts_with(self.root.dir()) {
            return Err(StoreError::PathEscape(path.to_path_buf()));
        }
        Ok(mark_ticket_done(path)?)
    }

    /// Move the repo's tickets into the run's archive directory.
    ///
    /// Returns the number of files moved.
    pub fn archive_tickets(&self, run_id: &RunId) -> Result<usize, StoreError> {
        let tickets_dir = self.root.tickets_dir();
        let archive_dir = self.root.tickets_archive_dir(run_id)?;
        let entries = match fs::read_dir(&tickets_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&tickets_dir, e)),
        };
        fs::create_dir_all(&archive_dir).map_err(|e| StoreError::io(&archive_dir, e))?;
        let mut moved = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&tickets_dir, e))?;
            let from = entry.path();
            if !from.is_file() {
                continue;
            }
            let to = archive_dir.join(entry.file_name());
            fs::rename(&from, &to).map_err(|e| StoreError::io(&from, e))?;
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
