// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::{Path, PathBuf};

/// Resolve the hub root: CAR_HUB_ROOT, else the current directory.
pub fn hub_root() -> PathBuf {
    if let Ok(dir) = std::env::var("CAR_HUB_ROOT") {
        return PathBuf::from(dir);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Daemon runtime dir under the hub state root.
pub fn daemon_dir(hub_root: &Path) -> PathBuf {
    car_storage::StateRoot::new(hub_root).daemon_dir()
}

/// Unix socket the daemon listens on.
pub fn socket_path(hub_root: &Path) -> PathBuf {
    daemon_dir(hub_root).join("card.sock")
}

/// Daemon pid file.
pub fn pid_path(hub_root: &Path) -> PathBuf {
    daemon_dir(hub_root).join("card.pid")
}

/// Daemon log file.
pub fn log_path(hub_root: &Path) -> PathBuf {
    daemon_dir(hub_root).join("card.log")
}

/// PTY session registry file.
pub fn pty_registry_path(hub_root: &Path) -> PathBuf {
    daemon_dir(hub_root).join("pty_sessions.json")
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
