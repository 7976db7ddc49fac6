use assert_cmd::Command;

fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
fn help_lists_command_groups() {
    let assert = Command::cargo_bin("car")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
    let stdout = stdout_of(assert);
    for group in ["pma", "hub", "flow", "daemon"] {
        assert!(stdout.contains(group), "help missing {group}:\n{stdout}");
    }
}

#[test]
fn version_prints() {
    let assert = Command::cargo_bin("car")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
    assert!(stdout_of(assert).contains("car"));
}

#[test]
fn flow_help_names_ticket_flow() {
    let assert = Command::cargo_bin("car")
        .unwrap()
        .args(["flow", "--help"])
        .assert()
        .success();
    assert!(stdout_of(assert).contains("ticket_flow"));
}
