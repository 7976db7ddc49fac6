// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client: connect, auto-start, request/response.

use anyhow::{anyhow, bail, Context, Result};
use car_daemon::protocol::{self, Request, Response};
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;

/// How long to wait for the daemon to come up after spawning it.
const STARTUP_BUDGET: Duration = Duration::from_secs(10);

/// Connect to the hub daemon, starting it if needed.
pub async fn connect(hub_root: &Path) -> Result<UnixStream> {
    let socket_path = car_daemon::env::socket_path(hub_root);
    if let Ok(stream) = UnixStream::connect(&socket_path).await {
        return Ok(stream);
    }

    crate::daemon_process::spawn(hub_root)?;

    let deadline = tokio::time::Instant::now() + STARTUP_BUDGET;
    loop {
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => return Ok(stream),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => {
                return Err(anyhow!(e)).context(format!(
                    "daemon did not come up on {}",
                    socket_path.display()
                ))
            }
        }
    }
}

/// One request/response exchange.
pub async fn request(hub_root: &Path, request: Request) -> Result<Response> {
    let stream = connect(hub_root).await?;
    let (mut reader, mut writer) = stream.into_split();

    let data = protocol::encode(&request)?;
    protocol::write_message(&mut writer, &data).await?;

    let bytes = tokio::time::timeout(Duration::from_secs(30), protocol::read_message(&mut reader))
        .await
        .context("daemon response timed out")??;
    Ok(protocol::decode(&bytes)?)
}

/// Exchange that treats a protocol-level `Error` response as a failure.
pub async fn expect_ok(hub_root: &Path, req: Request) -> Result<Response> {
    match request(hub_root, req).await? {
        Response::Error { detail, error } => match error {
            Some(tag) => bail!("{} ({})", detail, tag),
            None => bail!("{}", detail),
        },
        response => Ok(response),
    }
}
