// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use car_core::DeliveryTarget;

#[test]
fn add_dedupes_by_key() {
    let mut file = TargetsFile::default();
    assert!(file.add(DeliveryTarget::Web));
    assert!(!file.add(DeliveryTarget::Web));
    assert_eq!(file.targets.len(), 1);
}

#[test]
fn coalesce_keeps_first_occurrence() {
    let mut file = TargetsFile {
        targets: vec![
            DeliveryTarget::Web,
            DeliveryTarget::telegram("1", None),
            DeliveryTarget::Web,
        ],
        ..Default::default()
    };
    file.coalesce();
    assert_eq!(file.targets.len(), 2);
    assert_eq!(file.targets[0], DeliveryTarget::Web);
}

#[test]
fn remove_by_key() {
    let mut file = TargetsFile::default();
    file.add(DeliveryTarget::discord("9"));
    assert!(file.remove("chat:discord:9").is_some());
    assert!(file.remove("chat:discord:9").is_none());
}

#[test]
fn chunk_limit_defaults_and_overrides() {
    let config = DeliveryConfig::default();
    assert_eq!(config.limit_for(&DeliveryTarget::Web), 3_500);

    let config = DeliveryConfig {
        chunk_limit: 4_000,
        platform_chunk_limits: [("discord".to_string(), 1_900)].into(),
    };
    assert_eq!(config.limit_for(&DeliveryTarget::Web), 4_000);
    assert_eq!(config.limit_for(&DeliveryTarget::discord("9")), 1_900);
    assert_eq!(config.limit_for(&DeliveryTarget::telegram("1", None)), 4_000);
}

#[test]
fn versionless_file_upgrades() {
    let json = r#"{"targets": [{"kind": "web"}]}"#;
    let file: TargetsFile = serde_json::from_str(json).unwrap();
    assert_eq!(file.version, TARGETS_FILE_VERSION);
    assert_eq!(file.targets, vec![DeliveryTarget::Web]);
}
