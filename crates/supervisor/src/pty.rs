// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw PTY terminal multiplexer.
//!
//! Each terminal is a real pseudo-terminal owned by the hub. Clients attach
//! by session id (a refreshed browser reattaches to the same terminal),
//! receive a bounded replay of recent output, then live bytes. Full history
//! lives in mirrors, not here.

use crate::error::SupervisorError;
use car_core::{RepoId, SessionId};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Bytes of output replayed to a newly attached client.
const REPLAY_CAP: usize = 64 * 1024;

/// Live output fan-out capacity (chunks, not bytes).
const OUTPUT_CHANNEL_CAP: usize = 256;

/// Bounded byte ring for attach replay.
struct ByteRing {
    buf: VecDeque<u8>,
    cap: usize,
}

impl ByteRing {
    fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap.min(4096)),
            cap,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.len() == self.cap {
                self.buf.pop_front();
            }
            self.buf.push_back(b);
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }
}

/// How to launch a terminal.
#[derive(Debug, Clone)]
pub struct PtySpawnSpec {
    pub repo_id: RepoId,
    /// Full argv (destination-resolved; see `DestinationExecutor::argv`).
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

/// A client's view of a terminal after attach.
pub struct PtyAttachment {
    pub session_id: SessionId,
    /// Last bytes of output, for immediate redraw.
    pub replay: Vec<u8>,
    /// Live output chunks from now on.
    pub output: broadcast::Receiver<Vec<u8>>,
}

struct PtyHandle {
    repo_id: RepoId,
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send>>,
    ring: Arc<Mutex<ByteRing>>,
    output: broadcast::Sender<Vec<u8>>,
    started_at_ms: u64,
}

/// Registry file contents (`daemon/pty_sessions.json`). Lets a reconnecting
/// client discover which terminal ids are live; cleared on daemon start
/// because the processes die with the daemon.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PtyRegistryFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    sessions: HashMap<String, PtyRegistryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PtyRegistryEntry {
    repo_id: RepoId,
    started_at_ms: u64,
}

/// Owner of all PTY terminals.
#[derive(Clone)]
pub struct PtyMultiplexer {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<PtyHandle>>>>,
    registry_path: Option<PathBuf>,
}

impl PtyMultiplexer {
    /// Create a multiplexer; `registry_path` is reset because no terminal
    /// survives a daemon restart.
    pub fn new(registry_path: Option<PathBuf>) -> Self {
        let mux = Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            registry_path,
        };
        mux.persist_registry();
        mux
    }

    /// Attach to a live terminal by id, or spawn a new one.
    ///
    /// When `close_old` names a session, it is torn down first (atomically
    /// with the spawn, under the registry lock).
    pub fn attach_or_spawn(
        &self,
        existing: Option<&SessionId>,
        close_old: Option<&SessionId>,
        spec: &PtySpawnSpec,
        epoch_ms: u64,
    ) -> Result<PtyAttachment, SupervisorError> {
        if let Some(session_id) = existing {
            if let Some(attachment) = self.attach(session_id) {
                return Ok(attachment);
            }
        }
        if let Some(old) = close_old {
            let _ = self.close(old);
        }
        self.spawn(spec, epoch_ms)
    }

    fn attach(&self, session_id: &SessionId) -> Option<PtyAttachment> {
        let sessions = self.sessions.lock();
        let handle = sessions.get(session_id)?;
        let replay = handle.ring.lock().snapshot();
        let output = handle.output.subscribe();
        Some(PtyAttachment {
            session_id: session_id.clone(),
            replay,
            output,
        })
    }

    fn spawn(
        &self,
        spec: &PtySpawnSpec,
        epoch_ms: u64,
    ) -> Result<PtyAttachment, SupervisorError> {
        if spec.argv.is_empty() {
            return Err(SupervisorError::SpawnFailed("empty argv".to_string()));
        }
        let pty = native_pty_system()
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..]);
        cmd.cwd(&spec.cwd);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pty
            .slave
            .spawn_command(cmd)
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;
        drop(pty.slave);

        let mut reader = pty
            .master
            .try_clone_reader()
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;
        let writer = pty
            .master
            .take_writer()
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

        let session_id = SessionId::new(format!("pty-{}", uuid::Uuid::new_v4().simple()));
        let ring = Arc::new(Mutex::new(ByteRing::new(REPLAY_CAP)));
        let (output_tx, output_rx) = broadcast::channel(OUTPUT_CHANNEL_CAP);

        let handle = Arc::new(PtyHandle {
            repo_id: spec.repo_id.clone(),
            master: Mutex::new(pty.master),
            writer: Mutex::new(writer),
            killer: Mutex::new(child.clone_killer()),
            ring: Arc::clone(&ring),
            output: output_tx.clone(),
            started_at_ms: epoch_ms,
        });

        // Blocking reader thread: the portable-pty reader is sync.
        {
            let id = session_id.clone();
            let sessions = Arc::clone(&self.sessions);
            std::thread::spawn(move || {
                let mut buf = [0u8; 8192];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            ring.lock().push(&buf[..n]);
                            // Lagging receivers miss chunks; the ring
                            // covers redraw on reattach.
                            let _ = output_tx.send(buf[..n].to_vec());
                        }
                    }
                }
                // Reap the child so it never lingers as a zombie.
                let _ = child.wait();
                debug!(session = %id, "pty reader finished");
                sessions.lock().remove(&id);
            });
        }

        self.sessions
            .lock()
            .insert(session_id.clone(), Arc::clone(&handle));
        self.persist_registry();

        let replay = handle.ring.lock().snapshot();
        Ok(PtyAttachment {
            session_id,
            replay,
            output: output_rx,
        })
    }

    /// Write client keystrokes to the terminal.
    pub fn write_input(&self, session_id: &SessionId, bytes: &[u8]) -> Result<(), SupervisorError> {
        let handle = self.handle(session_id)?;
        let mut writer = handle.writer.lock();
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| SupervisorError::SendFailed(e.to_string()))
    }

    pub fn resize(
        &self,
        session_id: &SessionId,
        rows: u16,
        cols: u16,
    ) -> Result<(), SupervisorError> {
        let handle = self.handle(session_id)?;
        let result = handle.master.lock().resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        });
        result.map_err(|e| SupervisorError::SendFailed(e.to_string()))
    }

    pub fn close(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        let handle = {
            let mut sessions = self.sessions.lock();
            sessions.remove(session_id)
        }
        .ok_or_else(|| SupervisorError::NotFound(session_id.to_string()))?;
        if let Err(e) = handle.killer.lock().kill() {
            warn!(session = %session_id, error = %e, "pty kill failed");
        }
        self.persist_registry();
        Ok(())
    }

    pub fn list(&self) -> Vec<(SessionId, RepoId, u64)> {
        self.sessions
            .lock()
            .iter()
            .map(|(id, h)| (id.clone(), h.repo_id.clone(), h.started_at_ms))
            .collect()
    }

    fn handle(&self, session_id: &SessionId) -> Result<Arc<PtyHandle>, SupervisorError> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(session_id.to_string()))
    }

    fn persist_registry(&self) {
        let Some(path) = &self.registry_path else {
            return;
        };
        let file = PtyRegistryFile {
            version: 1,
            sessions: self
                .sessions
                .lock()
                .iter()
                .map(|(id, h)| {
                    (
                        id.to_string(),
                        PtyRegistryEntry {
                            repo_id: h.repo_id.clone(),
                            started_at_ms: h.started_at_ms,
                        },
                    )
                })
                .collect(),
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(path = %path.display(), error = %e, "pty registry write failed");
        }
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
