// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fake adapter for router tests.

use crate::adapter::{AdapterError, ChatAdapter, ChunkPayload};
use car_core::DeliveryTarget;
use parking_lot::Mutex;
use std::collections::HashSet;

/// A chunk the fake accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentChunk {
    pub outbox_id: String,
    pub target_key: String,
    pub text: String,
}

#[derive(Debug, Default)]
struct FakeInner {
    sent: Vec<SentChunk>,
    seen: HashSet<String>,
    fail_keys: HashSet<String>,
}

/// Records sends; fails for scripted target keys; suppresses duplicate
/// outbox ids like a well-behaved adapter must.
#[derive(Debug, Default)]
pub struct FakeChatAdapter {
    inner: Mutex<FakeInner>,
}

impl FakeChatAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to this target key fail.
    pub fn fail_for(&self, target_key: &str) {
        self.inner.lock().fail_keys.insert(target_key.to_string());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().fail_keys.clear();
    }

    pub fn sent(&self) -> Vec<SentChunk> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent.len()
    }
}

#[async_trait::async_trait]
impl ChatAdapter for FakeChatAdapter {
    async fn send(
        &self,
        outbox_id: &str,
        target: &DeliveryTarget,
        payload: &ChunkPayload,
    ) -> Result<(), AdapterError> {
        let mut inner = self.inner.lock();
        let target_key = target.target_key();
        if inner.fail_keys.contains(&target_key) {
            return Err(AdapterError(format!("scripted failure for {}", target_key)));
        }
        if !inner.seen.insert(outbox_id.to_string()) {
            return Ok(()); // idempotent retry, no new user-visible message
        }
        inner.sent.push(SentChunk {
            outbox_id: outbox_id.to_string(),
            target_key,
            text: payload.text.clone(),
        });
        Ok(())
    }
}
