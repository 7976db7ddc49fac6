// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL mirrors.

use crate::atomic::{append_jsonl, read_jsonl};
use crate::error::StoreError;
use crate::root::StateRoot;
use car_core::{MirrorDirection, MirrorRecord, RunId};
use std::path::PathBuf;

fn mirror_path(
    root: &StateRoot,
    run_id: &RunId,
    direction: MirrorDirection,
) -> Result<PathBuf, StoreError> {
    let name = match direction {
        MirrorDirection::Inbound => "inbound.jsonl",
        MirrorDirection::Outbound => "outbound.jsonl",
    };
    Ok(root.chat_dir(run_id)?.join(name))
}

/// Append one record to a run's inbound or outbound mirror.
pub(crate) fn append_chat_mirror(
    root: &StateRoot,
    run_id: &RunId,
    record: &MirrorRecord,
) -> Result<(), StoreError> {
    append_jsonl(&mirror_path(root, run_id, record.direction)?, record)
}

/// Read a run's mirror in append order.
pub(crate) fn read_chat_mirror(
    root: &StateRoot,
    run_id: &RunId,
    direction: MirrorDirection,
) -> Result<Vec<MirrorRecord>, StoreError> {
    read_jsonl(&mirror_path(root, run_id, direction)?)
}

/// Append one record to the hub-wide `pma/deliveries.jsonl` mirror.
pub(crate) fn append_delivery_record<T: serde::Serialize>(
    root: &StateRoot,
    record: &T,
) -> Result<(), StoreError> {
    append_jsonl(&root.deliveries_path(), record)
}

#[cfg(test)]
#[path = "mirrors_tests.rs"]
mod tests;
