// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::adapter::AdapterRegistry;
use crate::fake::FakeChatAdapter;
use car_core::{ChatPlatform, DeliveryTarget};
use car_storage::{HubStore, TargetsFile};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    store: HubStore,
    fake: Arc<FakeChatAdapter>,
    router: DeliveryRouter,
}

/// One fake adapter behind web, local, telegram, and discord.
fn fixture(targets: Vec<DeliveryTarget>) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let store = HubStore::new(tmp.path());

    let mut file = TargetsFile::default();
    for target in targets {
        file.add(target);
    }
    store.write_targets(&file).unwrap();

    let fake = Arc::new(FakeChatAdapter::new());
    let adapters = AdapterRegistry::new()
        .with_web(fake.clone())
        .with_local(fake.clone())
        .with_chat(ChatPlatform::Telegram, fake.clone())
        .with_chat(ChatPlatform::Discord, fake.clone());
    let router = DeliveryRouter::new(store.clone(), adapters);
    Fixture {
        _tmp: tmp,
        store,
        fake,
        router,
    }
}

fn four_targets() -> Vec<DeliveryTarget> {
    vec![
        DeliveryTarget::Web,
        DeliveryTarget::Local {
            path: "pma/deliveries-copy.jsonl".to_string(),
        },
        DeliveryTarget::telegram("123", Some("456".to_string())),
        DeliveryTarget::discord("987654321"),
    ]
}

fn mirror_lines(store: &HubStore) -> Vec<serde_json::Value> {
    let content = fs::read_to_string(store.root().deliveries_path()).unwrap_or_default();
    content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn outbox_ids_are_exact_strings() {
    assert_eq!(outbox_id(false, "t1", "web", 0), "pma:t1:web:0");
    assert_eq!(
        outbox_id(false, "t1", "chat:telegram:123:456", 2),
        "pma:t1:chat:telegram:123:456:2"
    );
    assert_eq!(
        outbox_id(true, "d7", "chat:discord:9", 0),
        "pma-dispatch:d7:chat:discord:9:0"
    );
}

#[tokio::test]
async fn fan_out_hits_every_target_in_key_order() {
    let fixture = fixture(four_targets());
    let outcome = fixture
        .router
        .deliver(&DeliveryRequest::output("t1", "hello"), 1_000)
        .await
        .unwrap();

    assert_eq!(outcome.delivery_status, DeliveryStatus::Success);
    assert_eq!(outcome.targets.len(), 4);

    let sent = fixture.fake.sent();
    let ids: Vec<&str> = sent.iter().map(|s| s.outbox_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "pma:t1:chat:discord:987654321:0",
            "pma:t1:chat:telegram:123:456:0",
            "pma:t1:local:pma/deliveries-copy.jsonl:0",
            "pma:t1:web:0",
        ]
    );

    // One mirror line with all four outcomes.
    let lines = mirror_lines(&fixture.store);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["targets"].as_array().unwrap().len(), 4);
    assert_eq!(lines[0]["delivery_status"], "success");
}

#[tokio::test]
async fn retry_with_same_turn_is_duplicate_only() {
    let fixture = fixture(four_targets());
    let request = DeliveryRequest::output("t1", "hello");

    let first = fixture.router.deliver(&request, 1_000).await.unwrap();
    assert_eq!(first.delivery_status, DeliveryStatus::Success);
    let sent_after_first = fixture.fake.sent_count();

    let second = fixture.router.deliver(&request, 2_000).await.unwrap();
    assert_eq!(second.delivery_status, DeliveryStatus::DuplicateOnly);
    // Zero new adapter calls.
    assert_eq!(fixture.fake.sent_count(), sent_after_first);
    // All four outcomes are dedupe skips.
    assert!(second
        .targets
        .iter()
        .all(|t| t.skipped.as_deref() == Some("duplicate")));

    // The mirror gained a line for the duplicate attempt too.
    assert_eq!(mirror_lines(&fixture.store).len(), 2);
}

#[tokio::test]
async fn partial_failure_updates_dedupe_only_for_successes() {
    let fixture = fixture(four_targets());
    fixture.fake.fail_for("chat:discord:987654321");

    let request = DeliveryRequest::output("t1", "hello");
    let outcome = fixture.router.deliver(&request, 1_000).await.unwrap();
    assert_eq!(outcome.delivery_status, DeliveryStatus::PartialSuccess);

    let targets = fixture.store.read_targets().unwrap();
    assert_eq!(targets.last_delivery("web"), Some("t1"));
    assert_eq!(targets.last_delivery("chat:telegram:123:456"), Some("t1"));
    assert_eq!(targets.last_delivery("chat:discord:987654321"), None);

    // A retry re-attempts only discord.
    fixture.fake.clear_failures();
    let retry = fixture.router.deliver(&request, 2_000).await.unwrap();
    let attempted: Vec<&TargetOutcome> = retry
        .targets
        .iter()
        .filter(|t| t.skipped.is_none())
        .collect();
    assert_eq!(attempted.len(), 1);
    assert_eq!(attempted[0].target_key, "chat:discord:987654321");
    assert!(attempted[0].ok);
    assert_eq!(retry.delivery_status, DeliveryStatus::Success);
}

#[tokio::test]
async fn all_failures_is_failed() {
    let fixture = fixture(vec![DeliveryTarget::Web]);
    fixture.fake.fail_for("web");
    let outcome = fixture
        .router
        .deliver(&DeliveryRequest::output("t1", "x"), 1_000)
        .await
        .unwrap();
    assert_eq!(outcome.delivery_status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn no_targets_is_skipped() {
    let fixture = fixture(Vec::new());
    let outcome = fixture
        .router
        .deliver(&DeliveryRequest::output("t1", "x"), 1_000)
        .await
        .unwrap();
    assert_eq!(outcome.delivery_status, DeliveryStatus::Skipped);
    assert_eq!(outcome.reason.as_deref(), Some("no_targets"));
    assert_eq!(fixture.fake.sent_count(), 0);
}

#[tokio::test]
async fn dispatches_bypass_dedupe() {
    let fixture = fixture(vec![DeliveryTarget::Web]);
    let request = DeliveryRequest::dispatch("d1", "notice");

    let first = fixture.router.deliver(&request, 1_000).await.unwrap();
    let second = fixture.router.deliver(&request, 2_000).await.unwrap();
    assert_eq!(first.delivery_status, DeliveryStatus::Success);
    // Same outbox ids: the adapter's idempotency absorbs the retry, but
    // the router attempted it (dispatches are never deduped).
    assert_eq!(second.delivery_status, DeliveryStatus::Success);
    assert_eq!(fixture.fake.sent_count(), 1);
}

#[tokio::test]
async fn long_payload_chunks_with_sequential_indexes() {
    let fixture = fixture(vec![DeliveryTarget::telegram("1", None)]);
    let mut file = fixture.store.read_targets().unwrap();
    file.config = Some(car_storage::DeliveryConfig {
        chunk_limit: 10,
        platform_chunk_limits: Default::default(),
    });
    fixture.store.write_targets(&file).unwrap();

    let outcome = fixture
        .router
        .deliver(&DeliveryRequest::output("t1", "x".repeat(25)), 1_000)
        .await
        .unwrap();
    assert_eq!(outcome.targets[0].chunks_sent, 3);

    let ids: Vec<String> = fixture.fake.sent().iter().map(|s| s.outbox_id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            "pma:t1:chat:telegram:1:0",
            "pma:t1:chat:telegram:1:1",
            "pma:t1:chat:telegram:1:2",
        ]
    );
}

#[tokio::test]
async fn explicit_targets_override_configured_set() {
    let fixture = fixture(four_targets());
    let mut request = DeliveryRequest::output("t1", "x");
    request.targets = Some(vec![DeliveryTarget::Web]);

    let outcome = fixture.router.deliver(&request, 1_000).await.unwrap();
    assert_eq!(outcome.targets.len(), 1);
    assert_eq!(outcome.targets[0].target_key, "web");
}

#[tokio::test]
async fn channel_directory_is_never_consulted() {
    let fixture = fixture(vec![DeliveryTarget::telegram("123", None)]);

    // Delete the directory cache entirely; delivery must be unaffected.
    let _ = fs::remove_file(fixture.store.root().channel_directory_path());
    let outcome = fixture
        .router
        .deliver(&DeliveryRequest::output("t1", "x"), 1_000)
        .await
        .unwrap();
    assert_eq!(outcome.delivery_status, DeliveryStatus::Success);
}

#[tokio::test]
async fn missing_adapter_is_a_per_target_failure() {
    let tmp = TempDir::new().unwrap();
    let store = HubStore::new(tmp.path());
    let mut file = TargetsFile::default();
    file.add(DeliveryTarget::Web);
    file.add(DeliveryTarget::telegram("1", None));
    store.write_targets(&file).unwrap();

    let fake = Arc::new(FakeChatAdapter::new());
    // Only web registered; telegram has no adapter.
    let router = DeliveryRouter::new(store, AdapterRegistry::new().with_web(fake.clone()));

    let outcome = router
        .deliver(&DeliveryRequest::output("t1", "x"), 1_000)
        .await
        .unwrap();
    assert_eq!(outcome.delivery_status, DeliveryStatus::PartialSuccess);
    let failed: Vec<&TargetOutcome> = outcome.targets.iter().filter(|t| !t.ok).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_ref().unwrap().contains("telegram"));
}
