//! Integration tests for core CLI contract behavior.

use {
    predicates::prelude::*,
    std::{fs, path::PathBuf},
    tempfile::{TempDir, tempdir},
};

const RFC_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";

/// Command isolated from the caller's environment and config files.
fn cli_cmd(dir: &TempDir) -> assert_cmd::Command {
    let config = empty_config(dir);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.current_dir(dir.path())
        .env_remove("ATAUTH_KEY")
        .env_remove("ATAUTH_PORT")
        .env_remove("ATAUTH_BAUD")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config);
    cmd
}

fn empty_config(dir: &TempDir) -> PathBuf {
    let path = dir
        .path()
        .join("empty.toml");
    if !path.exists() {
        fs::write(&path, "").expect("config should be written");
    }
    path
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("atauth"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("atauth"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn unknown_command_exits_two() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.arg("frobnicate")
        .assert()
        .code(2);
}

#[test]
fn list_ports_json_returns_valid_json() {
    let dir = tempdir().expect("tempdir should be created");
    let output = cli_cmd(&dir)
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    if output
        .status
        .success()
    {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: serde_json::Value =
            serde_json::from_str(&stdout).expect("stdout should be JSON");
        assert!(parsed.is_array());
    }
}

#[test]
fn completions_write_script_to_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("atauth"));
}

#[test]
fn mac_matches_rfc4493_empty_message() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["--key", RFC_KEY, "mac", ""])
        .assert()
        .success()
        .stdout("bb1d6929e95937287fa37d129b756746\n");
}

#[test]
fn mac_matches_rfc4493_one_block() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["--key", RFC_KEY, "mac", "6bc1bee22e409f96e93d7e117393172a"])
        .assert()
        .success()
        .stdout("070a16b46b4d4144f79bdd9dd04a287c\n");
}

#[test]
fn mac_reads_key_from_env() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .env("ATAUTH_KEY", RFC_KEY)
        .args(["mac", ""])
        .assert()
        .success()
        .stdout("bb1d6929e95937287fa37d129b756746\n");
}

#[test]
fn key_flag_overrides_env() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .env("ATAUTH_KEY", "00".repeat(16))
        .args(["--key", RFC_KEY, "mac", ""])
        .assert()
        .success()
        .stdout("bb1d6929e95937287fa37d129b756746\n");
}

#[test]
fn mac_reads_key_file_from_config() {
    let dir = tempdir().expect("tempdir should be created");
    let key_path = dir
        .path()
        .join("device.key");
    fs::write(&key_path, format!("{RFC_KEY}\n")).expect("key should be written");
    let config_path = dir
        .path()
        .join("atauth.toml");
    fs::write(
        &config_path,
        format!("[auth]\nkey_file = {:?}\n", key_path.display().to_string()),
    )
    .expect("config should be written");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.current_dir(dir.path())
        .env_remove("ATAUTH_KEY")
        .arg("--config")
        .arg(&config_path)
        .args(["mac", ""])
        .assert()
        .success()
        .stdout("bb1d6929e95937287fa37d129b756746\n");
}

#[test]
fn mac_without_key_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["mac", "00"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No key configured"));
}

#[test]
fn mac_with_short_key_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["--key", "0011", "mac", "00"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid pre-shared key"));
}

#[test]
fn mac_with_bad_hex_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["--key", RFC_KEY, "mac", "xyz"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid hex message"));
}

#[test]
fn auth_checks_key_before_touching_ports() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args(["--non-interactive", "auth"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No key configured"));
}

#[test]
fn auth_on_missing_port_fails_with_runtime_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(&dir)
        .args([
            "--key",
            RFC_KEY,
            "--port",
            "/nonexistent/ttyAT0",
            "auth",
            "--timeout",
            "1",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Failed to open serial port"));
}

#[test]
fn invalid_toml_config_warns_and_continues() {
    let dir = tempdir().expect("tempdir should be created");
    let config_path = dir
        .path()
        .join("broken.toml");
    fs::write(&config_path, "invalid toml [[[").expect("config should be written");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config_path)
        .args(["--key", RFC_KEY, "mac", ""])
        .assert()
        .success()
        .stdout("bb1d6929e95937287fa37d129b756746\n")
        .stderr(predicate::str::contains("TOML"));
}

#[test]
fn bad_framing_in_config_is_reported() {
    let dir = tempdir().expect("tempdir should be created");
    let config_path = dir
        .path()
        .join("atauth.toml");
    fs::write(&config_path, "[connection]\nparity = \"mark\"\n").expect("config should be written");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("atauth");
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["--key", RFC_KEY, "--port", "/nonexistent/ttyAT0", "auth"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("parity"));
}
