// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning the hub daemon from the CLI.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Spawn `card` detached for the given hub root.
///
/// Looks for the daemon binary next to the current executable first (the
/// usual install layout), then falls back to PATH.
pub fn spawn(hub_root: &Path) -> Result<()> {
    let binary = daemon_binary();
    Command::new(&binary)
        .env("CAR_HUB_ROOT", hub_root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn daemon `{}`", binary))?;
    Ok(())
}

fn daemon_binary() -> String {
    if let Ok(current) = std::env::current_exe() {
        let sibling = current.with_file_name("card");
        if sibling.exists() {
            return sibling.display().to_string();
        }
    }
    "card".to_string()
}
