// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow run records (`flows/<run_id>/run.json`).

use crate::atomic::{read_json, write_json_atomic};
use crate::error::StoreError;
use crate::root::StateRoot;
use car_core::{FlowRun, FlowType, RunId};
use std::fs;

/// Persist a run record (create or overwrite).
pub(crate) fn save_run(root: &StateRoot, run: &FlowRun) -> Result<(), StoreError> {
    write_json_atomic(&root.run_record_path(&run.run_id)?, run)
}

/// Load one run record.
pub(crate) fn load_run(root: &StateRoot, run_id: &RunId) -> Result<FlowRun, StoreError> {
    read_json(&root.run_record_path(run_id)?)?
        .ok_or_else(|| StoreError::NotFound(format!("run {}", run_id)))
}

/// All runs of a flow type, newest first (run ids sort by creation time).
pub(crate) fn list_runs(
    root: &StateRoot,
    flow_type: FlowType,
) -> Result<Vec<FlowRun>, StoreError> {
    let flows_dir = root.flows_dir();
    let entries = match fs::read_dir(&flows_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&flows_dir, e)),
    };

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&flows_dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let run_id = RunId::new(entry.file_name().to_string_lossy().into_owned());
        // Tolerate foreign directories under flows/; a missing run.json is
        // not a corrupt run.
        match read_json::<FlowRun>(&root.run_record_path(&run_id)?)? {
            Some(run) if run.flow_type == flow_type => runs.push(run),
            _ => {}
        }
    }
    runs.sort_by(|a, b| b.run_id.as_str().cmp(a.run_id.as_str()));
    Ok(runs)
}

/// The active (non-terminal) run for a flow type, if any.
pub(crate) fn find_active_run(
    root: &StateRoot,
    flow_type: FlowType,
) -> Result<Option<FlowRun>, StoreError> {
    Ok(list_runs(root, flow_type)?
        .into_iter()
        .find(|run| run.status.is_active()))
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
