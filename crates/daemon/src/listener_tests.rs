// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::Request;
use car_core::RepoId;
use car_storage::{RepoEntry, RepoKind};
use std::fs;
use tempfile::TempDir;

fn ctx(tmp: &TempDir) -> Arc<HubContext> {
    HubContext::new(tmp.path())
}

async fn request(ctx: &HubContext, request: Request) -> Response {
    let shutdown = Notify::new();
    handle_request(request, ctx, &shutdown).await
}

#[tokio::test]
async fn ping_pong() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);
    assert_eq!(request(&ctx, Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn hello_reports_version() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);
    match request(
        &ctx,
        Request::Hello {
            version: "0".to_string(),
        },
    )
    .await
    {
        Response::Hello { version } => assert!(!version.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn target_management_cycle() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);

    let response = request(
        &ctx,
        Request::TargetsAdd {
            target_ref: "chat:telegram:123:456".to_string(),
        },
    )
    .await;
    match response {
        Response::Targets { targets, .. } => {
            assert_eq!(targets, vec!["chat:telegram:123:456"]);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Duplicate add keeps one entry.
    request(
        &ctx,
        Request::TargetsAdd {
            target_ref: "chat:telegram:123:456".to_string(),
        },
    )
    .await;
    match request(&ctx, Request::TargetsList).await {
        Response::Targets { targets, .. } => assert_eq!(targets.len(), 1),
        other => panic!("unexpected {other:?}"),
    }

    match request(
        &ctx,
        Request::TargetsRemove {
            target_ref: "chat:telegram:123:456".to_string(),
        },
    )
    .await
    {
        Response::Targets { targets, .. } => assert!(targets.is_empty()),
        other => panic!("unexpected {other:?}"),
    }

    // Removing again: not found.
    match request(
        &ctx,
        Request::TargetsRemove {
            target_ref: "chat:telegram:123:456".to_string(),
        },
    )
    .await
    {
        Response::Error { error, .. } => assert_eq!(error.as_deref(), Some("not_found")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn invalid_target_ref_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);
    match request(
        &ctx,
        Request::TargetsAdd {
            target_ref: "smoke:signals".to_string(),
        },
    )
    .await
    {
        Response::Error { error, .. } => assert_eq!(error.as_deref(), Some("invalid_target")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn bootstrap_maps_flow_errors_to_tags() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);

    // Unknown repo.
    match request(
        &ctx,
        Request::Bootstrap {
            repo_id: RepoId::new("ghost"),
        },
    )
    .await
    {
        Response::Error { error, .. } => assert_eq!(error.as_deref(), Some("not_found")),
        other => panic!("unexpected {other:?}"),
    }

    // Known repo, no tickets.
    let repo_dir = tmp.path().join("repo");
    fs::create_dir_all(&repo_dir).unwrap();
    ctx.upsert_repo(
        RepoId::new("demo"),
        RepoEntry {
            path: repo_dir,
            kind: RepoKind::Base,
            worktree_of: None,
            initialized: true,
            destination: None,
        },
    )
    .unwrap();
    match request(
        &ctx,
        Request::Bootstrap {
            repo_id: RepoId::new("demo"),
        },
    )
    .await
    {
        Response::Error { error, .. } => {
            assert_eq!(error.as_deref(), Some("precondition_failed"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn destination_set_requires_known_repo() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);
    match request(
        &ctx,
        Request::DestinationSet {
            repo_id: RepoId::new("ghost"),
            destination: None,
        },
    )
    .await
    {
        Response::Error { error, .. } => assert_eq!(error.as_deref(), Some("not_found")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_notifies() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx(&tmp);
    let shutdown = Arc::new(Notify::new());
    let notified = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { shutdown.notified().await })
    };
    let response = handle_request(Request::Shutdown, &ctx, &shutdown).await;
    assert_eq!(response, Response::ShuttingDown);
    notified.await.unwrap();
}
