// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PMA delivery targets file (`pma/delivery_targets.json`, v1).

use car_core::DeliveryTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current targets-file schema version.
pub const TARGETS_FILE_VERSION: u32 = 1;

/// Chunking knobs. The defaults are safe for every supported platform;
/// operators can lower them per platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
    /// Per-platform overrides keyed by platform name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform_chunk_limits: BTreeMap<String, usize>,
}

fn default_chunk_limit() -> usize {
    3_500
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            chunk_limit: default_chunk_limit(),
            platform_chunk_limits: BTreeMap::new(),
        }
    }
}

impl DeliveryConfig {
    /// Effective chunk limit for a target.
    pub fn limit_for(&self, target: &DeliveryTarget) -> usize {
        if let DeliveryTarget::Chat { platform, .. } = target {
            if let Some(limit) = self.platform_chunk_limits.get(platform.as_str()) {
                return *limit;
            }
        }
        self.chunk_limit
    }
}

/// The persisted targets file.
///
/// `target_key` is the sole identity: [`TargetsFile::coalesce`] collapses
/// duplicates before every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetsFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub targets: Vec<DeliveryTarget>,
    /// `target_key` → last successfully delivered `turn_id`.
    #[serde(default)]
    pub last_delivery_by_target: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DeliveryConfig>,
}

fn default_version() -> u32 {
    TARGETS_FILE_VERSION
}

impl TargetsFile {
    /// Drop duplicate targets, keeping the first occurrence of each key.
    pub fn coalesce(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        self.targets.retain(|t| seen.insert(t.target_key()));
    }

    /// Add a target; returns false when its key was already present.
    pub fn add(&mut self, target: DeliveryTarget) -> bool {
        let key = target.target_key();
        if self.targets.iter().any(|t| t.target_key() == key) {
            return false;
        }
        self.targets.push(target);
        true
    }

    /// Remove the target with the given key; returns it when present.
    pub fn remove(&mut self, target_key: &str) -> Option<DeliveryTarget> {
        let pos = self
            .targets
            .iter()
            .position(|t| t.target_key() == target_key)?;
        Some(self.targets.remove(pos))
    }

    pub fn last_delivery(&self, target_key: &str) -> Option<&str> {
        self.last_delivery_by_target
            .get(target_key)
            .map(|s| s.as_str())
    }

    pub fn config(&self) -> DeliveryConfig {
        self.config.clone().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "targets_tests.rs"]
mod tests;
