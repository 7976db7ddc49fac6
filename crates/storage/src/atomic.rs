// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file primitives.
//!
//! Every durable write goes through these helpers: serialize to a temp file
//! in the target directory, fsync, rename over the target — all while
//! holding an advisory lock on `<path>.lock`. Appends open with O_APPEND and
//! never truncate.

use crate::error::StoreError;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Advisory lock guard for one state path. Unlocks on drop.
pub(crate) struct PathLock {
    file: File,
    lock_path: PathBuf,
}

impl PathLock {
    /// Acquire the lock for `path`, blocking until available.
    pub(crate) fn acquire(path: &Path) -> Result<Self, StoreError> {
        let lock_path = lock_path_for(path);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| StoreError::io(&lock_path, e))?;
        Ok(Self { file, lock_path })
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.lock_path.display(), error = %e, "unlock failed");
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(".lock");
    path.with_file_name(name)
}

/// Atomically replace `path` with the JSON serialization of `value`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let _lock = PathLock::acquire(path)?;
    let json = serde_json::to_vec_pretty(value)?;
    replace_file(path, &json)
}

/// Atomically replace `path` with the YAML serialization of `value`.
pub(crate) fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let _lock = PathLock::acquire(path)?;
    let yaml = serde_yaml::to_string(value)?;
    replace_file(path, yaml.as_bytes())
}

/// Atomically replace `path` with raw bytes (already locked variants call
/// this directly).
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Read and parse an authoritative JSON file.
///
/// Returns `Ok(None)` when the file does not exist; a parse failure is
/// [`StoreError::FileCorrupt`].
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e.to_string()))
}

/// Read and parse an authoritative YAML file.
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_yaml::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e.to_string()))
}

/// Append one JSON line to `path` under its advisory lock.
///
/// The file is opened with O_APPEND and never truncated; prior content is
/// always a prefix of the new content.
pub(crate) fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let _lock = PathLock::acquire(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(&line).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Read every parseable line of a JSONL file. Torn trailing lines are
/// skipped with a warning — appends can race a reader.
pub(crate) fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut out = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(v) => out.push(v),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping unparseable mirror line"
                );
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
