// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! car-storage: the hub's durable state store.
//!
//! Every durable artifact lives under a `.codex-autorunner/` subtree of the
//! hub root or a repo root; this crate is the only code that reads or writes
//! those files. Writes are atomic (temp + rename) under per-path advisory
//! locks; mirrors are append-only; derived caches rebuild silently when
//! corrupt, authoritative files surface [`StoreError::FileCorrupt`].

mod atomic;
mod channels;
mod dispatches;
mod error;
mod handoffs;
mod manifest;
mod mirrors;
mod root;
mod runs;
mod store;
mod targets;

pub use channels::{ChannelDirectory, ChannelEntry};
pub use dispatches::{DispatchFront, DispatchPriority, DispatchRecord};
pub use error::StoreError;
pub use manifest::{Manifest, RepoEntry, RepoKind};
pub use root::StateRoot;
pub use store::{HubStore, RepoStore};
pub use targets::{DeliveryConfig, TargetsFile, TARGETS_FILE_VERSION};
