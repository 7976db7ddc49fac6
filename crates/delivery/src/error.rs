// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from delivery routing.
//!
//! Per-target adapter failures are not errors at this level — they are
//! captured in the per-target outcomes and reflected in the overall
//! delivery status.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] car_storage::StoreError),
}
