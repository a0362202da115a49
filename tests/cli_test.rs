use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_missing_panel_config_is_a_startup_error() {
    let mut cmd = Command::new(cargo_bin!("resellkit"));
    for var in [
        "XUI_BASE_URL",
        "XUI_USERNAME",
        "XUI_PASSWORD",
        "XUI_SERVER_HOST",
        "XUI_SUBSCRIPTION_PORT",
    ] {
        cmd.env_remove(var);
    }

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--base-url"));
}

#[test]
fn test_help_lists_panel_flags() {
    let mut cmd = Command::new(cargo_bin!("resellkit"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--base-url"))
        .stdout(predicate::str::contains("--server-host"))
        .stdout(predicate::str::contains("--agent-id"));
}
