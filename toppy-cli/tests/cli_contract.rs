//! Integration tests for core CLI contract behavior.
//!
//! None of these need a PVR attached: they cover argument handling and the
//! local-file checks that run before the device is opened.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("toppy");
    // Keep the user's environment out of the tests.
    for var in [
        "TOPPY_BUS",
        "TOPPY_ADDRESS",
        "TOPPY_TIMEOUT_MS",
        "TOPPY_IGNORE_CRC",
        "TOPPY_STRICT_CRC",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("toppy"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cli_cmd();
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("turbo")
            .and(predicate::str::contains("dir"))
            .and(predicate::str::contains("get"))
            .and(predicate::str::contains("put"))
            .and(predicate::str::contains("rename")),
    );
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_bash_exits_zero() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("toppy"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

/// Exit code 1: usage error (unknown command, invalid arguments)
#[test]
fn exit_code_one_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("unknown")));
}

#[test]
fn exit_code_one_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz").assert().failure().code(1);
}

#[test]
fn exit_code_one_for_bad_turbo_mode() {
    let mut cmd = cli_cmd();
    cmd.args(["turbo", "maybe"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid turbo mode"));
}

#[test]
fn exit_code_one_for_missing_argument() {
    let mut cmd = cli_cmd();
    cmd.arg("put").assert().failure().code(1);
}

#[test]
fn exit_code_one_for_conflicting_crc_flags() {
    let mut cmd = cli_cmd();
    cmd.args(["-i", "--strict-crc", "ready"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn put_missing_source_fails_before_device_access() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("missing.rec");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("put")
        .arg(missing.as_os_str())
        .arg("\\DataFiles\\missing.rec")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Can not open source file"));
}

#[test]
fn put_empty_source_fails_before_device_access() {
    let dir = tempdir().expect("tempdir should be created");
    let empty = dir.path().join("empty.rec");
    fs::write(&empty, b"").expect("write empty file");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("put")
        .arg(empty.as_os_str())
        .arg("\\DataFiles\\empty.rec")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn get_unwritable_destination_fails_before_device_access() {
    let dir = tempdir().expect("tempdir should be created");
    let dst = dir.path().join("no-such-dir").join("out.rec");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("get")
        .arg("\\DataFiles\\show.rec")
        .arg(dst.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Can not open destination file"));
}

#[test]
fn invalid_local_config_only_warns() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("toppy.toml"), "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn zero_timeout_fails_before_device_access() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--timeout-ms", "0", "ready"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Timeout must be at least 1 ms"));
}

#[test]
fn conflicting_crc_settings_in_config_warn() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[protocol]\nignore_crc = true\nstrict_crc = true\n")
        .expect("write config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(path.as_os_str())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::contains("using strict_crc"));
}

#[test]
fn quiet_config_lowers_log_level() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["-v", "completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::contains("toppy v"));

    fs::write(dir.path().join("toppy.toml"), "[output]\nquiet = true\n").expect("write config");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["-v", "completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::contains("toppy v").not());
}
