use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn rm2gl(dir: &TempDir) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("rm2gl");
    cmd.current_dir(dir.path());
    for var in [
        "RM2GL_SOURCE_HOST",
        "RM2GL_SOURCE_API_KEY",
        "RM2GL_TARGET_HOST",
        "RM2GL_TARGET_TOKEN",
        "RM2GL_DEFAULT_ACCOUNT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    rm2gl(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn no_arguments_prints_help_and_fails() {
    let dir = TempDir::new().unwrap();
    rm2gl(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn completions_are_generated() {
    let dir = TempDir::new().unwrap();
    rm2gl(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rm2gl"));
}

#[test]
fn explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    rm2gl(&dir)
        .args(["--config", "nope.yaml", "migrate"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn missing_hosts_fail_validation() {
    let dir = TempDir::new().unwrap();
    rm2gl(&dir)
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source.host is required"));
}

#[test]
fn missing_api_key_is_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("rm2gl.yaml"),
        "source:\n  host: http://127.0.0.1:9/\ntarget:\n  host: http://127.0.0.1:9/\n  token: secret\n",
    )
    .unwrap();
    rm2gl(&dir)
        .arg("migrate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing credential: source.api_key"));
}

#[test]
fn host_flags_override_the_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("rm2gl.yaml"), "page_size: 50\n").unwrap();
    rm2gl(&dir)
        .args([
            "--source-host",
            "http://127.0.0.1:9/",
            "--target-host",
            "http://127.0.0.1:9/",
            "migrate",
            "--project",
            "demo",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing credential"));
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("rm2gl.yaml"), "sauce:\n  host: x\n").unwrap();
    rm2gl(&dir)
        .arg("migrate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown field"));
}
