// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.

use crate::context::HubContext;
use crate::listener::Listener;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another daemon is already listening on {0}")]
    AlreadyRunning(String),
}

/// Bind the daemon socket, refusing to clobber a live daemon.
async fn bind_socket(hub_root: &Path) -> Result<UnixListener, LifecycleError> {
    let socket_path = crate::env::socket_path(hub_root);
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if socket_path.exists() {
        // A live daemon answers; a dead one left a stale socket behind.
        match tokio::net::UnixStream::connect(&socket_path).await {
            Ok(_) => {
                return Err(LifecycleError::AlreadyRunning(
                    socket_path.display().to_string(),
                ))
            }
            Err(_) => {
                fs::remove_file(&socket_path)?;
            }
        }
    }

    Ok(UnixListener::bind(&socket_path)?)
}

/// Initialize tracing: env-filtered, non-blocking appender into the hub
/// log dir. Returns the guard that flushes on drop.
pub fn init_tracing(
    hub_root: &Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = crate::env::log_path(hub_root);
    let log_dir = log_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| hub_root.to_path_buf());
    fs::create_dir_all(&log_dir)?;
    let file_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "card.log".to_string());

    let appender = tracing_appender::rolling::daily(&log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

/// Run the daemon until a shutdown request or signal.
pub async fn run_daemon(hub_root: &Path) -> Result<(), LifecycleError> {
    let listener_socket = bind_socket(hub_root).await?;
    let pid_path = crate::env::pid_path(hub_root);
    fs::write(&pid_path, std::process::id().to_string())?;

    let ctx = HubContext::new(hub_root);
    let shutdown = Arc::new(Notify::new());

    let listener = Listener::new(listener_socket, Arc::clone(&ctx), Arc::clone(&shutdown));
    tokio::spawn(listener.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        socket = %crate::env::socket_path(hub_root).display(),
        "daemon ready"
    );
    // Signal ready for the parent process (CLI waiting for startup).
    println!("READY");

    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested via command"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    let _ = fs::remove_file(crate::env::socket_path(hub_root));
    let _ = fs::remove_file(&pid_path);
    info!("daemon stopped");
    Ok(())
}
