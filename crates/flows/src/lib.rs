// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! car-flows: flow run orchestration.
//!
//! Hosts the per-run worker tasks that drive the ticket engine, the flow
//! lifecycle transitions (bootstrap/resume/stop/archive), and the in-process
//! event bus that fans one ordered event stream out to every subscriber.

mod bus;
mod engine;
mod error;
mod reply;
mod ring;
mod runtime;

pub use bus::{EventBus, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};
pub use error::FlowError;
pub use reply::{parse_reply, HandoffRequest, ParsedReply};
pub use ring::{LiveRing, RingSnapshot};
pub use runtime::{BootstrapOutcome, FlowConfig, FlowRuntime, ACTIVE_RUN_REUSED};
