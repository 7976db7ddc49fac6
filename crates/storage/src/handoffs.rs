// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handoff dispatch records (`flows/<run_id>/handoffs/<seq>.json`).
//!
//! Seq numbers are dense, start at 1, and are assigned under the handoff
//! directory's advisory lock so concurrent appends never collide.

use crate::atomic::{read_json, replace_file, PathLock};
use crate::error::StoreError;
use crate::root::StateRoot;
use car_core::{HandoffDispatch, HandoffMode, RunId};
use std::fs;
use std::path::Path;

/// Payload for a new handoff; seq and created_at are assigned on append.
#[derive(Debug, Clone)]
pub(crate) struct NewHandoff {
    pub mode: HandoffMode,
    pub title: String,
    pub body: String,
    pub attachments: Vec<String>,
}

fn next_seq(dir: &Path) -> Result<u64, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut max = 0u64;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(".json") {
            if let Ok(seq) = stem.parse::<u64>() {
                max = max.max(seq);
            }
        }
    }
    Ok(max + 1)
}

/// Append a handoff, returning the persisted record with its dense seq.
pub(crate) fn append_handoff(
    root: &StateRoot,
    run_id: &RunId,
    new: NewHandoff,
    created_at: String,
) -> Result<HandoffDispatch, StoreError> {
    let dir = root.handoffs_dir(run_id)?;
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

    // One lock file per handoff directory serializes seq assignment.
    let _lock = PathLock::acquire(&dir.join("handoffs"))?;
    let seq = next_seq(&dir)?;
    let dispatch = HandoffDispatch {
        seq,
        mode: new.mode,
        title: new.title,
        body: new.body,
        attachments: new.attachments,
        created_at,
    };
    let path = dir.join(format!("{}.json", seq));
    let json = serde_json::to_vec_pretty(&dispatch)?;
    replace_file(&path, &json)?;
    Ok(dispatch)
}

/// All handoffs of a run, in seq order.
pub(crate) fn list_handoffs(
    root: &StateRoot,
    run_id: &RunId,
) -> Result<Vec<HandoffDispatch>, StoreError> {
    let dir = root.handoffs_dir(run_id)?;
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };
    let mut handoffs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".json") {
            continue;
        }
        if let Some(dispatch) = read_json::<HandoffDispatch>(&entry.path())? {
            handoffs.push(dispatch);
        }
    }
    handoffs.sort_by_key(|h| h.seq);
    Ok(handoffs)
}

#[cfg(test)]
#[path = "handoffs_tests.rs"]
mod tests;
