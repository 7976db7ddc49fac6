// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Each connection is one request/response exchange, except `Subscribe`
//! which switches the connection to a stream of event frames until the run
//! closes or the client disconnects. Client disconnects cancel only their
//! subscription, never the underlying run.

use crate::context::HubContext;
use crate::protocol::{
    self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};
use car_core::DeliveryTarget;
use car_delivery::DeliveryRequest;
use car_flows::FlowError;
use car_storage::StoreError;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// Listener task for accepting socket connections.
pub struct Listener {
    socket: UnixListener,
    ctx: Arc<HubContext>,
    shutdown: Arc<Notify>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<HubContext>, shutdown: Arc<Notify>) -> Self {
        Self {
            socket,
            ctx,
            shutdown,
        }
    }

    /// Run the accept loop, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    let shutdown = Arc::clone(&self.shutdown);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx, &shutdown).await {
                            match e {
                                protocol::ProtocolError::ConnectionClosed => {
                                    debug!("client disconnected")
                                }
                                protocol::ProtocolError::Timeout => warn!("connection timeout"),
                                _ => error!("connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    ctx: &HubContext,
    shutdown: &Notify,
) -> Result<(), protocol::ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;

    if matches!(request, Request::Subscribe { .. }) {
        return handle_subscribe(request, ctx, &mut writer).await;
    }
    if matches!(request, Request::TerminalOpen { .. }) {
        return handle_terminal_open(request, ctx, &mut writer).await;
    }

    debug!(request = ?request, "received request");
    let response = handle_request(request, ctx, shutdown).await;
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await
}

/// Attach (or spawn) a terminal, then stream raw output bytes until the
/// client disconnects or the terminal exits.
async fn handle_terminal_open(
    request: Request,
    ctx: &HubContext,
    writer: &mut (impl tokio::io::AsyncWriteExt + Unpin),
) -> Result<(), protocol::ProtocolError> {
    let Request::TerminalOpen {
        repo_id,
        session_id,
        close_old,
        rows,
        cols,
    } = request
    else {
        unreachable!("caller checked");
    };

    let manifest = match ctx.hub.load_manifest() {
        Ok(manifest) => manifest,
        Err(e) => {
            return protocol::write_response(writer, &store_error(e), DEFAULT_TIMEOUT).await;
        }
    };
    let Some(entry) = manifest.get(&repo_id) else {
        let response = Response::error(format!("no repo {}", repo_id), Some("not_found"));
        return protocol::write_response(writer, &response, DEFAULT_TIMEOUT).await;
    };

    // The terminal runs an interactive shell at the repo's destination.
    let executor =
        car_supervisor::DestinationExecutor::new(manifest.resolve_destination(&repo_id));
    let spec = car_supervisor::PtySpawnSpec {
        repo_id: repo_id.clone(),
        argv: executor.argv(&car_supervisor::LaunchSpec::new("bash", entry.path.clone())),
        cwd: entry.path.clone(),
        env: vec![("TERM".to_string(), "xterm-256color".to_string())],
        rows,
        cols,
    };

    use car_core::Clock;
    let attachment = match ctx.pty.attach_or_spawn(
        session_id.as_ref(),
        close_old.as_ref(),
        &spec,
        ctx.clock.epoch_ms(),
    ) {
        Ok(attachment) => attachment,
        Err(e) => {
            let response = Response::error(e.to_string(), Some("terminal_failed"));
            return protocol::write_response(writer, &response, DEFAULT_TIMEOUT).await;
        }
    };

    let mut output = attachment.output;
    let response = Response::TerminalOpened {
        session_id: attachment.session_id.clone(),
        replay: attachment.replay,
    };
    protocol::write_response(writer, &response, DEFAULT_TIMEOUT).await?;

    loop {
        match output.recv().await {
            Ok(bytes) => {
                if protocol::write_message(writer, &bytes).await.is_err() {
                    debug!(session = %attachment.session_id, "terminal client disconnected");
                    break;
                }
            }
            // Lagged clients resync from the replay buffer on reattach.
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

/// Stream a run's events until the stream closes or the client goes away.
async fn handle_subscribe(
    request: Request,
    ctx: &HubContext,
    writer: &mut (impl tokio::io::AsyncWriteExt + Unpin),
) -> Result<(), protocol::ProtocolError> {
    let Request::Subscribe { run_id } = request else {
        unreachable!("caller checked");
    };
    let mut subscription = ctx.runtime.subscribe(&run_id);
    protocol::write_response(writer, &Response::Subscribed, DEFAULT_TIMEOUT).await?;

    while let Some(event) = subscription.recv().await {
        let terminal = event.is_terminal();
        if protocol::write_event(writer, &event).await.is_err() {
            // Client gone: drop only this subscription.
            debug!(run = %run_id, "subscriber disconnected");
            break;
        }
        if terminal {
            break;
        }
    }
    Ok(())
}

async fn handle_request(request: Request, ctx: &HubContext, shutdown: &Notify) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Bootstrap { repo_id } => match ctx.runtime.bootstrap(&repo_id) {
            Ok(outcome) => Response::Bootstrapped {
                run: outcome.run,
                hint: outcome.hint.map(|h| h.to_string()),
            },
            Err(e) => flow_error(e),
        },

        Request::Resume { repo_id, run_id } => {
            match ctx.runtime.resume(&repo_id, &run_id).await {
                Ok(()) => Response::Ok,
                Err(e) => flow_error(e),
            }
        }

        Request::Stop { repo_id, run_id } => match ctx.runtime.stop(&repo_id, &run_id).await {
            Ok(()) => Response::Ok,
            Err(e) => flow_error(e),
        },

        Request::Archive {
            repo_id,
            run_id,
            force,
        } => match ctx.runtime.archive(&repo_id, &run_id, force) {
            Ok(moved) => Response::Archived { moved },
            Err(e) => flow_error(e),
        },

        Request::Runs { repo_id } => match ctx.runtime.list_runs(&repo_id) {
            Ok(runs) => Response::Runs { runs },
            Err(e) => flow_error(e),
        },

        Request::Run { repo_id, run_id } => match ctx.runtime.get_run(&repo_id, &run_id) {
            Ok(run) => Response::Run { run },
            Err(e) => flow_error(e),
        },

        Request::HandoffHistory { repo_id, run_id } => {
            match ctx.runtime.handoff_history(&repo_id, &run_id) {
                Ok(handoffs) => Response::Handoffs { handoffs },
                Err(e) => flow_error(e),
            }
        }

        Request::LiveOutput { run_id } => match ctx.runtime.live_output(&run_id) {
            Some(snapshot) => Response::LiveOutput {
                lines: snapshot.lines,
                events: snapshot.events,
            },
            None => Response::error(format!("no live run {}", run_id), Some("not_found")),
        },

        Request::Subscribe { .. } => {
            unreachable!("subscribe handled before dispatch")
        }

        Request::PmaDeliver {
            id,
            text,
            is_dispatch,
        } => {
            let request = if is_dispatch {
                // Dispatches are durable operator notices: persist the
                // markdown file before fanning out.
                if let Err(e) = ctx.write_dispatch_file(&id, &text) {
                    warn!(dispatch = %id, error = %e, "dispatch file write failed");
                }
                DeliveryRequest::dispatch(id, text)
            } else {
                DeliveryRequest::output(id, text)
            };
            match ctx.deliver(&request).await {
                Ok(outcome) => Response::Delivered { outcome },
                Err(e) => Response::error(e.to_string(), Some("delivery_failed")),
            }
        }

        Request::TargetsList => targets_response(ctx),

        Request::TargetsAdd { target_ref } => match target_ref.parse::<DeliveryTarget>() {
            Ok(target) => match with_targets(ctx, |file| file.add(target)) {
                Ok(_) => targets_response(ctx),
                Err(e) => store_error(e),
            },
            Err(e) => Response::error(e.to_string(), Some("invalid_target")),
        },

        Request::TargetsRemove { target_ref } => {
            match with_targets(ctx, |file| file.remove(&target_ref).is_some()) {
                Ok(true) => targets_response(ctx),
                Ok(false) => {
                    Response::error(format!("no target {}", target_ref), Some("not_found"))
                }
                Err(e) => store_error(e),
            }
        }

        Request::TargetsClear => match with_targets(ctx, |file| file.targets.clear()) {
            Ok(()) => targets_response(ctx),
            Err(e) => store_error(e),
        },

        Request::DestinationShow { repo_id } => match ctx.resolve_destination(&repo_id) {
            Ok(destination) => Response::Destination { destination },
            Err(e) => store_error(e),
        },

        Request::DestinationSet {
            repo_id,
            destination,
        } => {
            let result = ctx.update_manifest(|manifest| match manifest.repos.get_mut(&repo_id) {
                Some(entry) => {
                    entry.destination = destination;
                    true
                }
                None => false,
            });
            match result {
                Ok(true) => Response::Ok,
                Ok(false) => {
                    Response::error(format!("no repo {}", repo_id), Some("not_found"))
                }
                Err(e) => store_error(e),
            }
        }

        Request::RepoUpsert { repo_id, entry } => match ctx.upsert_repo(repo_id, entry) {
            Ok(()) => Response::Ok,
            Err(e) => store_error(e),
        },

        Request::RepoRemove { repo_id } => match ctx.remove_repo(&repo_id).await {
            Ok(true) => Response::Ok,
            Ok(false) => Response::error(format!("no repo {}", repo_id), Some("not_found")),
            Err(e) => store_error(e),
        },

        Request::Sessions => {
            use car_supervisor::AgentSessions;
            Response::Sessions {
                sessions: ctx.sessions.list_sessions(),
            }
        }

        Request::Dispatches => match ctx.hub.list_dispatches() {
            Ok(dispatches) => Response::Dispatches {
                dispatches: dispatches
                    .into_iter()
                    .map(|d| crate::protocol::DispatchSummary {
                        id: d.id,
                        title: d.front.title,
                        priority: match d.front.priority {
                            car_storage::DispatchPriority::Info => "info".to_string(),
                            car_storage::DispatchPriority::Action => "action".to_string(),
                        },
                        created_at: d.front.created_at,
                        resolved_at: d.front.resolved_at,
                    })
                    .collect(),
            },
            Err(e) => store_error(e),
        },

        Request::DispatchResolve { stem } => {
            let resolved_at = chrono_now();
            match ctx.hub.resolve_dispatch(&stem, &resolved_at) {
                Ok(()) => Response::Ok,
                Err(e) => store_error(e),
            }
        }

        Request::TerminalOpen { .. } => {
            unreachable!("terminal open handled before dispatch")
        }

        Request::TerminalInput { session_id, bytes } => {
            match ctx.pty.write_input(&session_id, &bytes) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.to_string(), Some("terminal_failed")),
            }
        }

        Request::TerminalResize {
            session_id,
            rows,
            cols,
        } => match ctx.pty.resize(&session_id, rows, cols) {
            Ok(()) => Response::Ok,
            Err(e) => Response::error(e.to_string(), Some("terminal_failed")),
        },

        Request::TerminalClose { session_id } => match ctx.pty.close(&session_id) {
            Ok(()) => Response::Ok,
            Err(e) => Response::error(e.to_string(), Some("terminal_failed")),
        },

        Request::Shutdown => {
            shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn with_targets<T>(
    ctx: &HubContext,
    f: impl FnOnce(&mut car_storage::TargetsFile) -> T,
) -> Result<T, StoreError> {
    let mut file = ctx.hub.read_targets()?;
    let result = f(&mut file);
    ctx.hub.write_targets(&file)?;
    Ok(result)
}

fn targets_response(ctx: &HubContext) -> Response {
    match ctx.hub.read_targets() {
        Ok(file) => Response::Targets {
            targets: file.targets.iter().map(|t| t.target_key()).collect(),
            last_delivery_by_target: file.last_delivery_by_target,
        },
        Err(e) => store_error(e),
    }
}

fn flow_error(e: FlowError) -> Response {
    let tag = match &e {
        FlowError::PreconditionFailed(_) => "precondition_failed",
        FlowError::NotFound(_) => "not_found",
        FlowError::InvalidTransition { .. } => "invalid_transition",
        FlowError::Store(StoreError::FileCorrupt { .. }) => "file_corrupt",
        FlowError::Store(_) => "store_error",
        FlowError::Supervisor(_) => "supervisor_error",
    };
    Response::error(e.to_string(), Some(tag))
}

fn store_error(e: StoreError) -> Response {
    let tag = match &e {
        StoreError::FileCorrupt { .. } => "file_corrupt",
        StoreError::NotFound(_) => "not_found",
        StoreError::PathEscape(_) => "path_escape",
        _ => "store_error",
    };
    Response::error(e.to_string(), Some(tag))
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
