// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! car-delivery: PMA delivery fan-out.
//!
//! Routes each PMA output or dispatch to every configured target exactly
//! once per `(turn_id, target_key)`. Outbox ids are deterministic strings;
//! adapters treat them as idempotency keys, so retries are always safe.

mod adapter;
mod chunk;
mod error;
mod router;

pub use adapter::{
    AdapterError, AdapterRegistry, ChatAdapter, ChunkPayload, InboundMessage, LocalFileAdapter,
    WebAdapter, WebDelivery,
};
pub use chunk::chunk_text;
pub use error::DeliveryError;
pub use router::{
    outbox_id, DeliveryOutcome, DeliveryRequest, DeliveryRouter, DeliveryStatus, TargetOutcome,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeChatAdapter, SentChunk};
