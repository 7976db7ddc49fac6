// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    web = { "web" },
    local = { "local:./pma/deliveries.jsonl" },
    telegram = { "chat:telegram:123" },
    telegram_thread = { "chat:telegram:123:456" },
    discord = { "chat:discord:987654321" },
)]
fn key_round_trips_through_parse(key: &str) {
    let target: DeliveryTarget = key.parse().unwrap();
    assert_eq!(target.target_key(), key);
}

#[test]
fn telegram_thread_key_form() {
    let target = DeliveryTarget::telegram("123", Some("456".to_string()));
    assert_eq!(target.target_key(), "chat:telegram:123:456");
}

#[test]
fn discord_has_no_thread_segment() {
    let target = DeliveryTarget::discord("987654321");
    assert_eq!(target.target_key(), "chat:discord:987654321");
}

#[parameterized(
    empty = { "", TargetParseError::Empty },
    bogus = { "smoke:signals", TargetParseError::UnknownKind("smoke".to_string()) },
    bad_platform = { "chat:irc:42", TargetParseError::UnknownPlatform("irc".to_string()) },
    no_chat_id = { "chat:telegram:", TargetParseError::MissingChatId("chat:telegram:".to_string()) },
    no_path = { "local:", TargetParseError::MissingPath },
)]
fn parse_failures(input: &str, expected: TargetParseError) {
    assert_eq!(input.parse::<DeliveryTarget>().unwrap_err(), expected);
}

#[test]
fn serde_tagged_form() {
    let target = DeliveryTarget::telegram("99", None);
    let json = serde_json::to_value(&target).unwrap();
    assert_eq!(json["kind"], "chat");
    assert_eq!(json["platform"], "telegram");
    assert_eq!(json["chat_id"], "99");
    let back: DeliveryTarget = serde_json::from_value(json).unwrap();
    assert_eq!(back, target);
}
