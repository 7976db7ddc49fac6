use assert_cmd::Command;

#[test]
fn unknown_subcommand_exits_2() {
    Command::cargo_bin("car")
        .unwrap()
        .arg("fly")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_required_args_exit_2() {
    Command::cargo_bin("car")
        .unwrap()
        .args(["flow", "ticket_flow", "bootstrap"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn invalid_target_ref_exits_1() {
    let hub = crate::prelude::Hub::new();
    hub.car()
        .args(["pma", "targets", "add", "smoke:signals"])
        .assert()
        .failure()
        .code(1);
}
