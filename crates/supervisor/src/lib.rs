// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! car-supervisor: agent process supervision.
//!
//! Owns the long-lived agent processes: app-server sessions driven over a
//! line-delimited JSON protocol, and raw PTY terminals. Spawning always goes
//! through the destination executor — the supervisor never execs directly —
//! so agent processes run on the host or inside a container transparently.

mod app_server;
mod destination;
mod error;
mod protocol;
mod pty;
mod registry;
mod subprocess;

pub use app_server::{AppServerSupervisor, SessionKey};
pub use destination::{DestinationExecutor, LaunchSpec};
pub use error::SupervisorError;
pub use protocol::{SessionEvent, TurnOutcome, TurnRequest};
pub use pty::{PtyAttachment, PtyMultiplexer, PtySpawnSpec};
pub use registry::{AgentSessions, SessionInfo, SessionState};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBehavior, FakeSessions, FakeTurn, SubmittedTurn};
