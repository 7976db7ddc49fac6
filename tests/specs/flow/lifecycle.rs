use crate::prelude::Hub;
use serial_test::serial;

fn stderr_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}

#[test]
#[serial]
fn bootstrap_unknown_repo_reports_not_found() {
    let hub = Hub::new();
    let assert = hub
        .car()
        .args(["flow", "ticket_flow", "bootstrap", "--repo", "ghost"])
        .assert()
        .failure()
        .code(1);
    assert!(stderr_of(assert).contains("not_found"));
}

#[test]
#[serial]
fn bootstrap_without_tickets_is_precondition_failed() {
    let hub = Hub::new();
    hub.add_repo("demo", &[]);
    let assert = hub
        .car()
        .args(["flow", "ticket_flow", "bootstrap", "--repo", "demo"])
        .assert()
        .failure()
        .code(1);
    assert!(stderr_of(assert).contains("precondition_failed"));
}

#[test]
#[serial]
fn status_of_fresh_repo_lists_no_runs() {
    let hub = Hub::new();
    hub.add_repo("demo", &[("TICKET-001.md", "Do the thing.")]);
    let assert = hub
        .car()
        .args(["flow", "ticket_flow", "status", "--repo", "demo"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("no runs"));
}

#[test]
#[serial]
fn destination_defaults_to_local() {
    let hub = Hub::new();
    hub.add_repo("demo", &[]);
    let assert = hub
        .car()
        .args(["hub", "destination", "show", "demo"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("local"));
}
