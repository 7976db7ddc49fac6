//! Shared helpers for CLI specs.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temp hub with a daemon lifetime bound to the value.
pub struct Hub {
    pub dir: TempDir,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A `car` command pointed at this hub.
    pub fn car(&self) -> Command {
        let mut cmd = Command::cargo_bin("car").unwrap();
        cmd.arg("--hub").arg(self.root());
        cmd.env("CAR_HUB_ROOT", self.root());
        cmd
    }

    /// Create a repo directory with the given tickets and register it.
    pub fn add_repo(&self, repo_id: &str, tickets: &[(&str, &str)]) -> PathBuf {
        let repo_dir = self.root().join(repo_id);
        let tickets_dir = repo_dir.join(".codex-autorunner/tickets");
        std::fs::create_dir_all(&tickets_dir).unwrap();
        for (name, body) in tickets {
            std::fs::write(
                tickets_dir.join(name),
                format!("---\ntitle: {}\ndone: false\n---\n{}\n", name, body),
            )
            .unwrap();
        }
        self.car()
            .args(["hub", "repo", "add", repo_id])
            .arg(&repo_dir)
            .assert()
            .success();
        repo_dir
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        // Best-effort: stop the daemon this hub's commands auto-started.
        let _ = self.car().args(["daemon", "stop"]).output();
    }
}
