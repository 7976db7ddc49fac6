// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub manifest: the repo directory.

use car_core::{Destination, RepoId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// Base checkout or worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoKind {
    #[default]
    Base,
    Worktree,
}

/// One managed repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub kind: RepoKind,
    /// For worktrees: the repo id of the base checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_of: Option<RepoId>,
    #[serde(default)]
    pub initialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
}

/// `manifest.yml`: every repo the hub drives, with destinations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub repos: IndexMap<RepoId, RepoEntry>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

impl Manifest {
    pub fn get(&self, repo_id: &RepoId) -> Option<&RepoEntry> {
        self.repos.get(repo_id)
    }

    /// Insert or replace a repo entry.
    pub fn upsert(&mut self, repo_id: RepoId, entry: RepoEntry) {
        self.repos.insert(repo_id, entry);
    }

    pub fn remove(&mut self, repo_id: &RepoId) -> Option<RepoEntry> {
        self.repos.shift_remove(repo_id)
    }

    /// Worktree ids whose `worktree_of` does not resolve to a base repo.
    /// The manifest invariant requires this to be empty.
    pub fn dangling_worktrees(&self) -> Vec<RepoId> {
        self.repos
            .iter()
            .filter(|(_, entry)| entry.kind == RepoKind::Worktree)
            .filter(|(_, entry)| {
                entry
                    .worktree_of
                    .as_ref()
                    .and_then(|base| self.repos.get(base))
                    .map(|base| base.kind == RepoKind::Base)
                    != Some(true)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Destination for a repo: its own, else its base's (for worktrees),
    /// else local.
    pub fn resolve_destination(&self, repo_id: &RepoId) -> Destination {
        let Some(entry) = self.repos.get(repo_id) else {
            return Destination::Local;
        };
        if let Some(dest) = &entry.destination {
            return dest.clone();
        }
        if let Some(base_id) = &entry.worktree_of {
            if let Some(base) = self.repos.get(base_id) {
                if let Some(dest) = &base.destination {
                    return dest.clone();
                }
            }
        }
        Destination::Local
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
