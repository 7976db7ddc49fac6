// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The chat adapter capability.
//!
//! Chat platform wire details live outside this crate; adapters implement
//! this narrow interface and are registered per platform. The router calls
//! `send` with a deterministic outbox id that adapters MUST treat as an
//! idempotency key.

use car_core::target::ChatPlatform;
use car_core::DeliveryTarget;
use car_storage::HubStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// One chunk handed to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub text: String,
    pub chunk_index: u32,
    pub chunk_count: u32,
    /// Attachment paths; present only on the first chunk.
    pub attachments: Vec<String>,
}

/// A single adapter failure, captured per target.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AdapterError(pub String);

/// An inbound chat message surfaced by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub platform: String,
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub actor: String,
    pub text: String,
}

/// Capability interface for all delivery surfaces.
#[async_trait::async_trait]
pub trait ChatAdapter: Send + Sync + std::fmt::Debug {
    /// Deliver one chunk. `outbox_id` is the idempotency key: a retry with
    /// the same id must not produce a duplicate user-visible message.
    async fn send(
        &self,
        outbox_id: &str,
        target: &DeliveryTarget,
        payload: &ChunkPayload,
    ) -> Result<(), AdapterError>;
}

/// Adapters available to the router, by target kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    web: Option<Arc<dyn ChatAdapter>>,
    local: Option<Arc<dyn ChatAdapter>>,
    chat: HashMap<ChatPlatform, Arc<dyn ChatAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_web(mut self, adapter: Arc<dyn ChatAdapter>) -> Self {
        self.web = Some(adapter);
        self
    }

    pub fn with_local(mut self, adapter: Arc<dyn ChatAdapter>) -> Self {
        self.local = Some(adapter);
        self
    }

    pub fn with_chat(mut self, platform: ChatPlatform, adapter: Arc<dyn ChatAdapter>) -> Self {
        self.chat.insert(platform, adapter);
        self
    }

    /// Adapter for a target, or an error naming the missing surface.
    pub fn adapter_for(&self, target: &DeliveryTarget) -> Result<Arc<dyn ChatAdapter>, AdapterError> {
        match target {
            DeliveryTarget::Web => self
                .web
                .clone()
                .ok_or_else(|| AdapterError("no web adapter registered".to_string())),
            DeliveryTarget::Local { .. } => self
                .local
                .clone()
                .ok_or_else(|| AdapterError("no local adapter registered".to_string())),
            DeliveryTarget::Chat { platform, .. } => {
                self.chat.get(platform).cloned().ok_or_else(|| {
                    AdapterError(format!("no adapter registered for platform {}", platform))
                })
            }
        }
    }
}

/// Line appended by the local file adapter.
#[derive(Debug, Serialize, Deserialize)]
struct LocalDeliveryLine<'a> {
    outbox_id: &'a str,
    text: &'a str,
    chunk_index: u32,
}

/// Appends deliveries to a JSONL file under the hub state root.
#[derive(Debug)]
pub struct LocalFileAdapter {
    store: HubStore,
    /// Outbox ids already written this process, for idempotent retries.
    seen: Mutex<HashSet<String>>,
}

impl LocalFileAdapter {
    pub fn new(store: HubStore) -> Self {
        Self {
            store,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait::async_trait]
impl ChatAdapter for LocalFileAdapter {
    async fn send(
        &self,
        outbox_id: &str,
        target: &DeliveryTarget,
        payload: &ChunkPayload,
    ) -> Result<(), AdapterError> {
        let DeliveryTarget::Local { path } = target else {
            return Err(AdapterError("local adapter got non-local target".to_string()));
        };
        if !self.seen.lock().insert(outbox_id.to_string()) {
            return Ok(()); // idempotent retry
        }
        let resolved = self
            .store
            .root()
            .join(path)
            .map_err(|e| AdapterError(e.to_string()))?;
        let line = LocalDeliveryLine {
            outbox_id,
            text: &payload.text,
            chunk_index: payload.chunk_index,
        };
        append_line(&resolved, &line).map_err(|e| AdapterError(e))
    }
}

fn append_line<T: Serialize>(path: &std::path::Path, value: &T) -> Result<(), String> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let mut line = serde_json::to_vec(value).map_err(|e| e.to_string())?;
    line.push(b'\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| e.to_string())?;
    file.write_all(&line).map_err(|e| e.to_string())
}

/// One delivery surfaced to web clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDelivery {
    pub outbox_id: String,
    pub text: String,
    pub chunk_index: u32,
    pub chunk_count: u32,
}

/// Publishes deliveries onto a channel the web layer drains (SSE shim).
#[derive(Debug)]
pub struct WebAdapter {
    sink: tokio::sync::mpsc::UnboundedSender<WebDelivery>,
    seen: Mutex<HashSet<String>>,
}

impl WebAdapter {
    pub fn new(sink: tokio::sync::mpsc::UnboundedSender<WebDelivery>) -> Self {
        Self {
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait::async_trait]
impl ChatAdapter for WebAdapter {
    async fn send(
        &self,
        outbox_id: &str,
        _target: &DeliveryTarget,
        payload: &ChunkPayload,
    ) -> Result<(), AdapterError> {
        if !self.seen.lock().insert(outbox_id.to_string()) {
            return Ok(());
        }
        self.sink
            .send(WebDelivery {
                outbox_id: outbox_id.to_string(),
                text: payload.text.clone(),
                chunk_index: payload.chunk_index,
                chunk_count: payload.chunk_count,
            })
            .map_err(|_| AdapterError("web sink closed".to_string()))
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
