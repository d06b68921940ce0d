//! CLI end-to-end tests for the `liveroll` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn liveroll() -> Command {
    let mut cmd = Command::cargo_bin("liveroll").expect("binary builds");
    // Isolate from the developer's environment.
    cmd.env_remove("LIVEROLL_CONFIG").env_remove("LIVEROLL_DATA_DIR");
    cmd
}

fn write_assets(dir: &Path, marker: &str) {
    fs::create_dir_all(dir).expect("mkdir assets");
    fs::write(dir.join("index.html"), format!("<html>{}</html>", marker)).expect("write asset");
}

fn write_config(tmp: &TempDir, repo: &Path) -> std::path::PathBuf {
    let path = tmp.path().join("liveroll.toml");
    fs::write(
        &path,
        format!(
            "app_id = \"shop-app\"\nendpoint = \"{}\"\n",
            repo.display()
        ),
    )
    .expect("write config");
    path
}

#[test]
fn pack_publishes_artifact_and_metadata() {
    let tmp = TempDir::new().expect("tempdir");
    let assets = tmp.path().join("dist");
    let repo = tmp.path().join("repo");
    write_assets(&assets, "v1");

    liveroll()
        .arg("pack")
        .arg(&assets)
        .args(["--app", "shop-app", "--bundle-version", "1.0.0"])
        .arg("--out")
        .arg(&repo)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": \"1.0.0\""));

    assert!(repo.join("artifacts/shop-app-1.0.0.zip").exists());
    let latest = fs::read_to_string(repo.join("apps/shop-app/latest.json")).expect("latest.json");
    assert!(latest.contains("\"version\": \"1.0.0\""));
    assert!(latest.contains("artifacts/shop-app-1.0.0.zip"));
}

#[test]
fn pack_rejects_invalid_version_token() {
    let tmp = TempDir::new().expect("tempdir");
    let assets = tmp.path().join("dist");
    write_assets(&assets, "v1");

    liveroll()
        .arg("pack")
        .arg(&assets)
        .args(["--app", "shop-app", "--bundle-version", "1.0-beta"])
        .arg("--out")
        .arg(tmp.path().join("repo"))
        .assert()
        .code(11)
        .stderr(predicate::str::contains("invalid version segment"));
}

#[test]
fn update_confirm_status_flow() {
    let tmp = TempDir::new().expect("tempdir");
    let assets = tmp.path().join("dist");
    let repo = tmp.path().join("repo");
    let data = tmp.path().join("data");
    write_assets(&assets, "v2");
    let config = write_config(&tmp, &repo);

    liveroll()
        .arg("pack")
        .arg(&assets)
        .args(["--app", "shop-app", "--bundle-version", "2.0.0"])
        .arg("--out")
        .arg(&repo)
        .assert()
        .success();

    // Apply: exit code 2 signals awaiting confirmation.
    liveroll()
        .arg("update")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"outcome\": \"activated\""));

    // Confirm within the window.
    liveroll()
        .arg("confirm")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"confirmed\": true"));

    liveroll()
        .arg("status")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .args(["--format", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state: confirmed"))
        .stdout(predicate::str::contains("active: 2.0.0"));

    // A second check finds nothing newer.
    liveroll()
        .arg("check")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("\"outcome\": \"up_to_date\""));

    liveroll()
        .arg("events")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"event\":\"confirmed\""));
}

#[test]
fn check_against_unreachable_endpoint_is_network_error() {
    let tmp = TempDir::new().expect("tempdir");
    let data = tmp.path().join("data");
    let config = write_config(&tmp, &tmp.path().join("no-such-repo"));

    liveroll()
        .arg("check")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .code(12);
}

#[test]
fn missing_config_is_a_config_error() {
    liveroll()
        .arg("status")
        .arg("--config")
        .arg("/no/such/liveroll.toml")
        .assert()
        .code(11)
        .stderr(predicate::str::contains("liveroll.toml"));
}
