use crate::prelude::Hub;
use serial_test::serial;

fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
#[serial]
fn add_list_rm_clear_cycle() {
    let hub = Hub::new();

    hub.car()
        .args(["pma", "targets", "add", "chat:telegram:123:456"])
        .assert()
        .success();
    hub.car()
        .args(["pma", "targets", "add", "web"])
        .assert()
        .success();

    let stdout = stdout_of(hub.car().args(["pma", "targets", "list"]).assert().success());
    assert!(stdout.contains("chat:telegram:123:456"));
    assert!(stdout.contains("web"));

    hub.car()
        .args(["pma", "targets", "rm", "web"])
        .assert()
        .success();
    let stdout = stdout_of(hub.car().args(["pma", "targets", "list"]).assert().success());
    assert!(!stdout.contains("web"));

    hub.car().args(["pma", "targets", "clear"]).assert().success();
    let stdout = stdout_of(hub.car().args(["pma", "targets", "list"]).assert().success());
    assert!(stdout.contains("no delivery targets"));

    // The targets file lives at the documented path.
    assert!(hub
        .root()
        .join(".codex-autorunner/pma/delivery_targets.json")
        .exists());
}

#[test]
#[serial]
fn json_output_is_machine_readable() {
    let hub = Hub::new();
    hub.car()
        .args(["pma", "targets", "add", "chat:discord:987654321"])
        .assert()
        .success();

    let stdout = stdout_of(
        hub.car()
            .args(["--json", "pma", "targets", "list"])
            .assert()
            .success(),
    );
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["targets"][0], "chat:discord:987654321");
}

#[test]
#[serial]
fn removing_unknown_target_fails() {
    let hub = Hub::new();
    hub.car()
        .args(["pma", "targets", "rm", "chat:discord:404"])
        .assert()
        .failure()
        .code(1);
}
