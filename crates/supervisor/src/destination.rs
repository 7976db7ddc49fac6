// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destination executor: turns a [`Destination`] into a way of running
//! agent processes.
//!
//! `local` spawns in the host environment. `docker` ensures the configured
//! container is running, then execs inside it. Preflight failures surface
//! as [`SupervisorError::DestinationUnavailable`]; there is no silent
//! fallback to local.

use crate::error::SupervisorError;
use crate::subprocess::{run_with_timeout, DOCKER_TIMEOUT, PREFLIGHT_TIMEOUT};
use car_core::Destination;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Binaries the `full-dev` profile requires inside a container.
const FULL_DEV_BINARIES: &[&str] = &[
    "codex", "opencode", "python3", "git", "rg", "bash", "node", "pnpm",
];

/// A resolved program invocation, independent of where it runs.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Executor for one destination value.
#[derive(Debug, Clone)]
pub struct DestinationExecutor {
    destination: Destination,
}

impl DestinationExecutor {
    pub fn new(destination: Destination) -> Self {
        Self { destination }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Verify the destination can run agent processes.
    ///
    /// Local destinations are always available. Docker destinations check
    /// the daemon, ensure the container is up, and (for the `full-dev`
    /// profile) verify the agent toolchain binaries.
    pub async fn preflight(&self) -> Result<(), SupervisorError> {
        match &self.destination {
            Destination::Local => Ok(()),
            Destination::Docker { profile, .. } => {
                self.ensure_container_running().await?;
                if profile.as_deref() == Some("full-dev") {
                    self.verify_binaries(FULL_DEV_BINARIES).await?;
                }
                Ok(())
            }
        }
    }

    /// Build a `tokio::process::Command` for the spec at this destination.
    ///
    /// For docker the command becomes `docker exec -i -w <cwd> <container>
    /// <program> <args…>`; the spec's cwd is used verbatim inside the
    /// container (the workdir override applies to container creation, not
    /// per-exec).
    pub fn command(&self, spec: &LaunchSpec) -> Command {
        match &self.destination {
            Destination::Local => {
                let mut cmd = Command::new(&spec.program);
                cmd.args(&spec.args).current_dir(&spec.cwd);
                for (key, value) in &spec.env {
                    cmd.env(key, value);
                }
                cmd
            }
            Destination::Docker { env, .. } => {
                let mut cmd = Command::new("docker");
                cmd.arg("exec").arg("-i");
                cmd.arg("-w").arg(spec.cwd.display().to_string());
                for (key, value) in env.iter().chain(spec.env.iter().map(|(k, v)| (k, v))) {
                    cmd.arg("-e").arg(format!("{}={}", key, value));
                }
                cmd.arg(self.container_name());
                cmd.arg(&spec.program).args(&spec.args);
                cmd
            }
        }
    }

    /// Shell argv for the same invocation, for PTY-backed launches.
    pub fn argv(&self, spec: &LaunchSpec) -> Vec<String> {
        match &self.destination {
            Destination::Local => {
                let mut argv = vec![spec.program.clone()];
                argv.extend(spec.args.iter().cloned());
                argv
            }
            Destination::Docker { env, .. } => {
                let mut argv = vec![
                    "docker".to_string(),
                    "exec".to_string(),
                    "-it".to_string(),
                    "-w".to_string(),
                    spec.cwd.display().to_string(),
                ];
                for (key, value) in env.iter().chain(spec.env.iter().map(|(k, v)| (k, v))) {
                    argv.push("-e".to_string());
                    argv.push(format!("{}={}", key, value));
                }
                argv.push(self.container_name());
                argv.push(spec.program.clone());
                argv.extend(spec.args.iter().cloned());
                argv
            }
        }
    }

    fn container_name(&self) -> String {
        match &self.destination {
            Destination::Local => String::new(),
            Destination::Docker {
                container_name,
                image,
                ..
            } => container_name.clone().unwrap_or_else(|| {
                let slug: String = image
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                    .collect();
                format!("car-{}", slug)
            }),
        }
    }

    /// Start the destination container when it is not already running.
    pub async fn ensure_container_running(&self) -> Result<(), SupervisorError> {
        let Destination::Docker {
            image,
            workdir,
            env_passthrough,
            env,
            mounts,
            ..
        } = &self.destination
        else {
            return Ok(());
        };
        let name = self.container_name();

        let mut inspect = Command::new("docker");
        inspect
            .args(["inspect", "--format", "{{.State.Running}}"])
            .arg(&name);
        let output = run_with_timeout(inspect, DOCKER_TIMEOUT, "docker inspect")
            .await
            .map_err(SupervisorError::DestinationUnavailable)?;

        if output.status.success() {
            if String::from_utf8_lossy(&output.stdout).trim() == "true" {
                debug!(container = %name, "container already running");
                return Ok(());
            }
            // Exists but stopped: remove so the run below starts clean.
            let mut rm = Command::new("docker");
            rm.args(["rm", "-f"]).arg(&name);
            run_with_timeout(rm, DOCKER_TIMEOUT, "docker rm")
                .await
                .map_err(SupervisorError::DestinationUnavailable)?;
        }

        let mut run = Command::new("docker");
        run.args(["run", "-d", "--name"]).arg(&name);
        if let Some(workdir) = workdir {
            run.args(["-w", workdir]);
        }
        for key in env_passthrough {
            if let Ok(value) = std::env::var(key) {
                run.arg("-e").arg(format!("{}={}", key, value));
            }
        }
        for (key, value) in env {
            run.arg("-e").arg(format!("{}={}", key, value));
        }
        for mount in default_agent_mounts().iter().chain(mounts.iter()) {
            let mut volume = format!("{}:{}", mount.source, mount.target);
            if mount.read_only {
                volume.push_str(":ro");
            }
            run.arg("-v").arg(volume);
        }
        // Keep the container alive for subsequent execs.
        run.arg(image).args(["sleep", "infinity"]);

        let output = run_with_timeout(run, DOCKER_TIMEOUT, "docker run")
            .await
            .map_err(SupervisorError::DestinationUnavailable)?;
        if !output.status.success() {
            return Err(SupervisorError::DestinationUnavailable(format!(
                "docker run failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!(container = %name, image = %image, "container started");
        Ok(())
    }

    /// Run one command inside the destination container.
    pub async fn exec_in_container(
        &self,
        argv: &[&str],
    ) -> Result<std::process::Output, SupervisorError> {
        let mut cmd = Command::new("docker");
        cmd.arg("exec").arg(self.container_name()).args(argv);
        run_with_timeout(cmd, DOCKER_TIMEOUT, "docker exec")
            .await
            .map_err(SupervisorError::DestinationUnavailable)
    }

    async fn verify_binaries(&self, binaries: &[&str]) -> Result<(), SupervisorError> {
        let mut script = String::from("for b in");
        for binary in binaries {
            script.push(' ');
            script.push_str(binary);
        }
        script.push_str("; do command -v \"$b\" >/dev/null || { echo \"$b\"; exit 1; }; done");

        let mut cmd = Command::new("docker");
        cmd.arg("exec")
            .arg(self.container_name())
            .args(["bash", "-c"])
            .arg(&script);
        let output = run_with_timeout(cmd, PREFLIGHT_TIMEOUT, "preflight")
            .await
            .map_err(SupervisorError::DestinationUnavailable)?;
        if !output.status.success() {
            let missing = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Err(SupervisorError::DestinationUnavailable(format!(
                "full-dev preflight: missing binary {}",
                if missing.is_empty() { "(unknown)".to_string() } else { missing }
            )));
        }
        Ok(())
    }
}

/// Mounts every docker destination gets: the agent CLIs' credential and
/// state directories.
fn default_agent_mounts() -> Vec<car_core::Mount> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    vec![
        car_core::Mount {
            source: home.join(".codex").display().to_string(),
            target: "/root/.codex".to_string(),
            read_only: false,
        },
        car_core::Mount {
            source: home
                .join(".local/share/opencode")
                .display()
                .to_string(),
            target: "/root/.local/share/opencode".to_string(),
            read_only: false,
        },
    ]
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod tests;
