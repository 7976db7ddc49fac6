// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket frontmatter.

use car_core::Agent;
use serde::{Deserialize, Serialize};

/// YAML frontmatter of a ticket file.
///
/// Unknown keys are preserved in `extra` so an operator's custom fields
/// survive a `done: true` rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TicketFront {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub agent: Agent,
    #[serde(default)]
    pub done: bool,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl TicketFront {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}
