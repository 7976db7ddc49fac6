// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The delivery router.
//!
//! For each PMA output or dispatch: deliver to every configured target,
//! exactly once per `(turn_id, target_key)`, append the durable mirror
//! line, and report a structured delivery status. A failing target never
//! aborts the turn or the remaining targets. The channel directory is
//! never consulted here.

use crate::adapter::{AdapterRegistry, ChunkPayload};
use crate::chunk::chunk_text;
use crate::error::DeliveryError;
use car_core::{DeliveryTarget, MirrorRecord, RunId};
use car_storage::{HubStore, RepoStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Overall result of one delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Every attempted target succeeded.
    Success,
    /// At least one succeeded and at least one failed.
    PartialSuccess,
    /// Every attempted target failed.
    Failed,
    /// Nothing was attempted; every target was a dedupe skip.
    DuplicateOnly,
    /// Nothing was attempted for a benign reason (no targets).
    Skipped,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::PartialSuccess => "partial_success",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::DuplicateOnly => "duplicate_only",
            DeliveryStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Per-target result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target_key: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub chunks_sent: u32,
    /// `Some("duplicate")` when skipped by per-target dedupe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// One delivery request.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Turn id for outputs; dispatch id for dispatches.
    pub id: String,
    pub is_dispatch: bool,
    pub text: String,
    pub attachments: Vec<String>,
    /// Explicit targets; defaults to the configured target set.
    pub targets: Option<Vec<DeliveryTarget>>,
    /// When set, successful chat deliveries are mirrored to this run's
    /// outbound log.
    pub run_mirror: Option<(RepoStore, RunId)>,
}

impl DeliveryRequest {
    pub fn output(turn_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: turn_id.into(),
            is_dispatch: false,
            text: text.into(),
            attachments: Vec::new(),
            targets: None,
            run_mirror: None,
        }
    }

    pub fn dispatch(dispatch_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: dispatch_id.into(),
            is_dispatch: true,
            text: text.into(),
            attachments: Vec::new(),
            targets: None,
            run_mirror: None,
        }
    }
}

/// Result of a delivery request, including the per-target breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub delivery_status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub targets: Vec<TargetOutcome>,
}

/// Line appended to `pma/deliveries.jsonl` per request.
#[derive(Debug, Serialize)]
struct DeliveryMirrorLine<'a> {
    ts: u64,
    id: &'a str,
    is_dispatch: bool,
    delivery_status: DeliveryStatus,
    targets: &'a [TargetOutcome],
}

/// Deterministic outbox id for one `(id, target_key, chunk_index)`.
pub fn outbox_id(is_dispatch: bool, id: &str, target_key: &str, chunk_index: u32) -> String {
    if is_dispatch {
        format!("pma-dispatch:{}:{}:{}", id, target_key, chunk_index)
    } else {
        format!("pma:{}:{}:{}", id, target_key, chunk_index)
    }
}

/// The router.
pub struct DeliveryRouter {
    store: HubStore,
    adapters: AdapterRegistry,
}

impl DeliveryRouter {
    pub fn new(store: HubStore, adapters: AdapterRegistry) -> Self {
        Self { store, adapters }
    }

    /// Route one request to every target.
    pub async fn deliver(
        &self,
        request: &DeliveryRequest,
        epoch_ms: u64,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let targets_file = self.store.read_targets()?;
        let config = targets_file.config();
        let mut targets = match &request.targets {
            Some(explicit) => explicit.clone(),
            None => targets_file.targets.clone(),
        };
        if targets.is_empty() {
            debug!(id = %request.id, "delivery skipped: no targets");
            return Ok(DeliveryOutcome {
                delivery_status: DeliveryStatus::Skipped,
                reason: Some("no_targets".to_string()),
                targets: Vec::new(),
            });
        }
        // Stable iteration order: ascending target key.
        targets.sort_by_key(|t| t.target_key());

        let mut outcomes: Vec<TargetOutcome> = Vec::with_capacity(targets.len());
        for target in &targets {
            let target_key = target.target_key();

            // Per-target dedupe, outputs only: dispatches always go out.
            if !request.is_dispatch
                && targets_file.last_delivery(&target_key) == Some(request.id.as_str())
            {
                debug!(id = %request.id, target = %target_key, "dedupe skip");
                outcomes.push(TargetOutcome {
                    target_key,
                    ok: false,
                    error: None,
                    chunks_sent: 0,
                    skipped: Some("duplicate".to_string()),
                });
                continue;
            }

            outcomes.push(
                self.deliver_to_target(request, target, &target_key, config.limit_for(target))
                    .await,
            );
        }

        // Dedupe bookkeeping: only targets that actually succeeded.
        if !request.is_dispatch {
            for outcome in outcomes.iter().filter(|o| o.ok) {
                self.store.record_delivery(&outcome.target_key, &request.id)?;
            }
        }

        // Run-scoped outbound mirror for chat deliveries.
        if let Some((repo, run_id)) = &request.run_mirror {
            for (target, outcome) in targets.iter().zip(outcomes.iter()) {
                if !outcome.ok {
                    continue;
                }
                if let DeliveryTarget::Chat {
                    platform,
                    chat_id,
                    thread_id,
                } = target
                {
                    let record = MirrorRecord {
                        ts: epoch_ms,
                        direction: car_core::MirrorDirection::Outbound,
                        platform: Some(platform.to_string()),
                        chat_id: Some(chat_id.clone()),
                        thread_id: thread_id.clone(),
                        message_id: None,
                        actor: Some("pma".to_string()),
                        kind: "delivery".to_string(),
                        text: request.text.clone(),
                        meta: serde_json::json!({"id": request.id}),
                    };
                    if let Err(e) = repo.append_chat_mirror(run_id, &record) {
                        warn!(run = %run_id, error = %e, "outbound mirror append failed");
                    }
                }
            }
        }

        let delivery_status = compute_status(&outcomes);
        self.store.append_delivery_record(&DeliveryMirrorLine {
            ts: epoch_ms,
            id: &request.id,
            is_dispatch: request.is_dispatch,
            delivery_status,
            targets: &outcomes,
        })?;

        info!(
            id = %request.id,
            status = %delivery_status,
            targets = outcomes.len(),
            "delivery routed"
        );
        Ok(DeliveryOutcome {
            delivery_status,
            reason: None,
            targets: outcomes,
        })
    }

    async fn deliver_to_target(
        &self,
        request: &DeliveryRequest,
        target: &DeliveryTarget,
        target_key: &str,
        chunk_limit: usize,
    ) -> TargetOutcome {
        let adapter = match self.adapters.adapter_for(target) {
            Ok(adapter) => adapter,
            Err(e) => {
                return TargetOutcome {
                    target_key: target_key.to_string(),
                    ok: false,
                    error: Some(e.to_string()),
                    chunks_sent: 0,
                    skipped: None,
                }
            }
        };

        let chunks = chunk_text(&request.text, chunk_limit);
        let chunk_count = chunks.len() as u32;
        let mut sent = 0u32;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_index = index as u32;
            let id = outbox_id(request.is_dispatch, &request.id, target_key, chunk_index);
            let payload = ChunkPayload {
                text: chunk,
                chunk_index,
                chunk_count,
                attachments: if chunk_index == 0 {
                    request.attachments.clone()
                } else {
                    Vec::new()
                },
            };
            match adapter.send(&id, target, &payload).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(target = %target_key, outbox = %id, error = %e, "adapter send failed");
                    return TargetOutcome {
                        target_key: target_key.to_string(),
                        ok: false,
                        error: Some(e.to_string()),
                        chunks_sent: sent,
                        skipped: None,
                    };
                }
            }
        }
        TargetOutcome {
            target_key: target_key.to_string(),
            ok: true,
            error: None,
            chunks_sent: sent,
            skipped: None,
        }
    }
}

fn compute_status(outcomes: &[TargetOutcome]) -> DeliveryStatus {
    let attempted: Vec<&TargetOutcome> =
        outcomes.iter().filter(|o| o.skipped.is_none()).collect();
    if attempted.is_empty() {
        return DeliveryStatus::DuplicateOnly;
    }
    let succeeded = attempted.iter().filter(|o| o.ok).count();
    if succeeded == attempted.len() {
        DeliveryStatus::Success
    } else if succeeded > 0 {
        DeliveryStatus::PartialSuccess
    } else {
        DeliveryStatus::Failed
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
