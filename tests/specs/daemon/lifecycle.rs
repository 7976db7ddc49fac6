use crate::prelude::Hub;
use serial_test::serial;

#[test]
#[serial]
fn start_status_stop_cycle() {
    let hub = Hub::new();

    hub.car().args(["daemon", "start"]).assert().success();
    let assert = hub.car().args(["daemon", "status"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("daemon running"));

    // Socket and pid file live under the daemon dir.
    let daemon_dir = hub.root().join(".codex-autorunner/daemon");
    assert!(daemon_dir.join("card.sock").exists());
    assert!(daemon_dir.join("card.pid").exists());

    hub.car().args(["daemon", "stop"]).assert().success();
}

#[test]
#[serial]
fn status_without_daemon_fails() {
    let hub = Hub::new();
    hub.car()
        .args(["daemon", "status"])
        .assert()
        .failure()
        .code(1);
}
