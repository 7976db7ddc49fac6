use crate::prelude::Hub;
use serial_test::serial;

fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
#[serial]
fn deliver_to_local_target_writes_mirror_and_dedupes() {
    let hub = Hub::new();
    hub.car()
        .args(["pma", "targets", "add", "local:pma/outbox.jsonl"])
        .assert()
        .success();

    let stdout = stdout_of(
        hub.car()
            .args(["pma", "deliver", "t1", "hello world"])
            .assert()
            .success(),
    );
    assert!(stdout.contains("delivery_status: success"), "{stdout}");

    // The local adapter wrote the payload with its outbox id.
    let outbox = hub.root().join(".codex-autorunner/pma/outbox.jsonl");
    let content = std::fs::read_to_string(&outbox).unwrap();
    assert!(content.contains("pma:t1:local:pma/outbox.jsonl:0"));

    // Same turn again: duplicate_only, nothing new written.
    let stdout = stdout_of(
        hub.car()
            .args(["pma", "deliver", "t1", "hello world"])
            .assert()
            .success(),
    );
    assert!(stdout.contains("delivery_status: duplicate_only"), "{stdout}");
    assert_eq!(
        std::fs::read_to_string(&outbox).unwrap().lines().count(),
        1
    );

    // The hub-wide deliveries mirror grew one line per request.
    let mirror = hub.root().join(".codex-autorunner/pma/deliveries.jsonl");
    assert_eq!(
        std::fs::read_to_string(&mirror).unwrap().lines().count(),
        2
    );
}

#[test]
#[serial]
fn dispatch_delivery_writes_dispatch_file() {
    let hub = Hub::new();
    hub.car()
        .args(["pma", "targets", "add", "local:pma/outbox.jsonl"])
        .assert()
        .success();

    hub.car()
        .args(["pma", "deliver", "d1", "Deploy blocked\nCI is red.", "--dispatch"])
        .assert()
        .success();

    // A markdown dispatch landed under pma/dispatches/.
    let dispatches_dir = hub.root().join(".codex-autorunner/pma/dispatches");
    let files: Vec<_> = std::fs::read_dir(&dispatches_dir).unwrap().collect();
    assert_eq!(files.len(), 1);

    let listed = stdout_of(
        hub.car()
            .args(["pma", "dispatches", "list"])
            .assert()
            .success(),
    );
    assert!(listed.contains("Deploy blocked"));
    assert!(listed.contains("open"));

    // Resolve it by stem.
    let stem = listed.split_whitespace().next().unwrap().to_string();
    hub.car()
        .args(["pma", "dispatches", "resolve", &stem])
        .assert()
        .success();
    let listed = stdout_of(
        hub.car()
            .args(["pma", "dispatches", "list"])
            .assert()
            .success(),
    );
    assert!(listed.contains("resolved"));
}

#[test]
#[serial]
fn deliver_without_targets_is_skipped() {
    let hub = Hub::new();
    let stdout = stdout_of(
        hub.car()
            .args(["pma", "deliver", "t1", "hello"])
            .assert()
            .success(),
    );
    assert!(stdout.contains("delivery_status: skipped"), "{stdout}");
}
