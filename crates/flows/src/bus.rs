// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event fan-out.
//!
//! Single-writer, many-reader: the flow runtime publishes one ordered
//! stream per run; subscribers get bounded queues. A slow subscriber loses
//! its oldest pending events — replaced by a `dropped` marker — and the
//! publisher never blocks. The bus is not durable; mirrors are.

use car_core::{FlowEvent, RunId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<FlowEvent>,
    /// Events dropped since the last marker was delivered.
    dropped: u64,
}

#[derive(Default)]
struct BusInner {
    per_run: HashMap<RunId, Vec<Subscriber>>,
    global: Vec<Subscriber>,
    next_id: u64,
}

/// One subscription's receiving end.
pub struct Subscription {
    rx: mpsc::Receiver<FlowEvent>,
}

impl Subscription {
    /// Next event; `None` when the subscription is closed.
    pub async fn recv(&mut self) -> Option<FlowEvent> {
        self.rx.recv().await
    }

    /// Non-blocking drain of everything currently queued.
    pub fn drain(&mut self) -> Vec<FlowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// The hub event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one run's events (or every event with `run_id=None`).
    pub fn subscribe(&self, run_id: Option<&RunId>, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(2));
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let subscriber = Subscriber {
            id: inner.next_id,
            tx,
            dropped: 0,
        };
        match run_id {
            Some(run_id) => inner
                .per_run
                .entry(run_id.clone())
                .or_default()
                .push(subscriber),
            None => inner.global.push(subscriber),
        }
        Subscription { rx }
    }

    /// Publish one event. Never blocks; slow subscribers drop.
    pub fn publish(&self, event: &FlowEvent) {
        let mut inner = self.inner.lock();
        let run_id = event.run_id().clone();
        if let Some(subscribers) = inner.per_run.get_mut(&run_id) {
            deliver_all(subscribers, event);
        }
        deliver_all(&mut inner.global, event);
    }

    /// Publish the terminal marker and close every per-run subscription.
    pub fn close_run(&self, run_id: &RunId, timestamp: u64) {
        let subscribers = {
            let mut inner = self.inner.lock();
            let closed = FlowEvent::StreamClosed {
                run_id: run_id.clone(),
                timestamp,
            };
            deliver_all(&mut inner.global, &closed);
            inner.per_run.remove(run_id)
        };
        let Some(mut subscribers) = subscribers else {
            return;
        };
        let closed = FlowEvent::StreamClosed {
            run_id: run_id.clone(),
            timestamp,
        };
        deliver_all(&mut subscribers, &closed);
        // Dropping the senders closes each subscriber's channel.
    }

    /// Number of live subscribers for a run (diagnostics).
    pub fn subscriber_count(&self, run_id: &RunId) -> usize {
        self.inner
            .lock()
            .per_run
            .get(run_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

fn deliver_all(subscribers: &mut Vec<Subscriber>, event: &FlowEvent) {
    subscribers.retain_mut(|subscriber| deliver(subscriber, event));
}

/// Deliver to one subscriber; returns false when the receiver is gone.
fn deliver(subscriber: &mut Subscriber, event: &FlowEvent) -> bool {
    // A pending drop debt is paid first so the marker lands in order.
    if subscriber.dropped > 0 {
        let marker = FlowEvent::Dropped {
            run_id: event.run_id().clone(),
            timestamp: event.timestamp(),
            dropped_n: subscriber.dropped,
        };
        match subscriber.tx.try_send(marker) {
            Ok(()) => subscriber.dropped = 0,
            Err(mpsc::error::TrySendError::Full(_)) => {
                subscriber.dropped += 1;
                debug!(subscriber = subscriber.id, "subscriber still lagging");
                return true;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
        }
    }
    match subscriber.tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            subscriber.dropped += 1;
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
