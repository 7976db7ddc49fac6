// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PMA dispatch files: markdown notices with YAML frontmatter under
//! `pma/dispatches/<ts>_<id>.md`. Setting `resolved_at` marks a dispatch
//! handled.

use serde::{Deserialize, Serialize};

/// Urgency of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPriority {
    #[default]
    Info,
    Action,
}

/// Frontmatter of a dispatch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchFront {
    pub title: String,
    #[serde(default)]
    pub priority: DispatchPriority,
    /// ISO-8601.
    pub created_at: String,
    pub source_turn_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    /// ISO-8601 when resolved, null otherwise.
    #[serde(default)]
    pub resolved_at: Option<String>,
}

/// A dispatch loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    /// File stem (`<ts>_<id>`).
    pub id: String,
    pub front: DispatchFront,
    pub body: String,
}

impl DispatchRecord {
    pub fn is_resolved(&self) -> bool {
        self.front.resolved_at.is_some()
    }
}
