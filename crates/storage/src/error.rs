// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from state store operations.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A write path resolved outside `.codex-autorunner/`. Always a bug in
    /// the caller; never retried.
    #[error("path escapes state root: {0}")]
    PathEscape(PathBuf),

    /// An authoritative JSON/YAML file failed to parse.
    #[error("corrupt state file: {path}: {message}")]
    FileCorrupt { path: PathBuf, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Ticket(#[from] car_ticket::TicketError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        StoreError::FileCorrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}
