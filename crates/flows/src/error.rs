// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from flow runtime operations.

use car_supervisor::SupervisorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    /// The current state forbids the request (e.g. bootstrap with no
    /// tickets, resume of a non-paused run). Surfaced, never retried.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: run is {status}, cannot {action}")]
    InvalidTransition { status: String, action: String },

    #[error(transparent)]
    Store(#[from] car_storage::StoreError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}
