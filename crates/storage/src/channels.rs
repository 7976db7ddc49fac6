// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel directory: a derived cache of chat channels observed inbound.
//!
//! This file is a hint for the operator UI only. Delivery never consults
//! it — explicit target refs stay valid whether or not the directory has
//! the entry — and a corrupt file is rebuilt silently.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub platform: String,
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Human-readable channel title when the platform supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub last_seen_ms: u64,
}

/// `chat/channel_directory.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDirectory {
    #[serde(default)]
    pub version: u32,
    /// Keyed by the canonical `chat:<platform>:<id>[:<thread>]` form.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelEntry>,
}

impl ChannelDirectory {
    /// Record an observation, updating `last_seen_ms` for known channels.
    pub fn record(&mut self, key: String, entry: ChannelEntry) {
        self.channels
            .entry(key)
            .and_modify(|existing| {
                existing.last_seen_ms = entry.last_seen_ms;
                if entry.title.is_some() {
                    existing.title = entry.title.clone();
                }
            })
            .or_insert(entry);
    }
}
