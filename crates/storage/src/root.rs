// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-root containment.
//!
//! A [`StateRoot`] wraps `<base>/.codex-autorunner` and hands out paths
//! strictly inside it. Escape attempts (absolute paths, `..` traversal) are
//! rejected before any filesystem call.

use crate::error::StoreError;
use car_core::RunId;
use std::path::{Component, Path, PathBuf};

/// Name of the state subtree under every hub and repo root.
pub const STATE_DIR: &str = ".codex-autorunner";

/// A validated handle on one `.codex-autorunner/` subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRoot {
    dir: PathBuf,
}

impl StateRoot {
    /// State root for the given hub or repo base directory.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            dir: base.as_ref().join(STATE_DIR),
        }
    }

    /// The `.codex-autorunner` directory itself.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a relative path inside the state root.
    ///
    /// Rejects absolute paths and any `..`/prefix component; symlinks are
    /// not chased — containment is lexical, matching the single-writer
    /// model where all paths originate in this crate.
    pub fn join(&self, rel: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let rel = rel.as_ref();
        if rel.is_absolute() {
            return Err(StoreError::PathEscape(rel.to_path_buf()));
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::PathEscape(rel.to_path_buf()));
                }
            }
        }
        Ok(self.dir.join(rel))
    }

    // -- hub layout --

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.yml")
    }

    pub fn targets_path(&self) -> PathBuf {
        self.dir.join("pma").join("delivery_targets.json")
    }

    pub fn deliveries_path(&self) -> PathBuf {
        self.dir.join("pma").join("deliveries.jsonl")
    }

    pub fn dispatches_dir(&self) -> PathBuf {
        self.dir.join("pma").join("dispatches")
    }

    /// Dispatch markdown path. Stems reach this from operator input, so the
    /// path goes through [`StateRoot::join`] containment.
    pub fn dispatch_path(&self, stem: &str) -> Result<PathBuf, StoreError> {
        self.join(
            Path::new("pma")
                .join("dispatches")
                .join(format!("{}.md", stem)),
        )
    }

    pub fn channel_directory_path(&self) -> PathBuf {
        self.dir.join("chat").join("channel_directory.json")
    }

    pub fn daemon_dir(&self) -> PathBuf {
        self.dir.join("daemon")
    }

    // -- repo layout --

    pub fn tickets_dir(&self) -> PathBuf {
        self.dir.join("tickets")
    }

    pub fn flows_dir(&self) -> PathBuf {
        self.dir.join("flows")
    }

    /// Per-run directory. Run ids reach this from operator input, so the
    /// path goes through [`StateRoot::join`] containment.
    pub fn run_dir(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        self.join(Path::new("flows").join(run_id.as_str()))
    }

    pub fn run_record_path(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        Ok(self.run_dir(run_id)?.join("run.json"))
    }

    pub fn handoffs_dir(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        Ok(self.run_dir(run_id)?.join("handoffs"))
    }

    pub fn chat_dir(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        Ok(self.run_dir(run_id)?.join("chat"))
    }

    pub fn tickets_archive_dir(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        Ok(self.run_dir(run_id)?.join("tickets_archive"))
    }

    pub fn app_server_workspaces_dir(&self) -> PathBuf {
        self.dir.join("app_server_workspaces")
    }
}

#[cfg(test)]
#[path = "root_tests.rs"]
mod tests;
