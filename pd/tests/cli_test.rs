//! CLI tests for `proberd --configtest`

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir, text: &str) -> std::path::PathBuf {
    let path = dir.path().join("proberd.yml");
    std::fs::write(&path, text).unwrap();
    path
}

fn proberd() -> Command {
    Command::cargo_bin("proberd").unwrap()
}

#[test]
fn test_configtest_accepts_valid_config() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "output-prefix: \"{{zone}}\"\nprobes:\n  - name: web\n    type: http\n    targets: [example.com]\n",
    );

    proberd()
        .arg("--configtest")
        .arg("--config-file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Config OK"));
}

#[test]
fn test_configtest_rejects_bad_yaml() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "probes: [\n");

    proberd()
        .args(["--configtest", "--config-file"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error parsing config file"));
}

#[test]
fn test_configtest_uses_placeholder_vars_only() {
    let temp = TempDir::new().unwrap();
    // hostname is a real sysvar but not one of the dry-run placeholders
    let path = write_config(&temp, "output-prefix: \"{{hostname}}\"\n");

    proberd()
        .args(["--configtest", "--config-file"])
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn test_configtest_missing_file() {
    let temp = TempDir::new().unwrap();

    proberd()
        .args(["--configtest", "--config-file"])
        .arg(temp.path().join("nope.yml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read configuration"));
}

#[test]
fn test_version_flag() {
    proberd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
