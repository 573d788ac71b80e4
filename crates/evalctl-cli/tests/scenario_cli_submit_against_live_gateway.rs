//! End-to-end CLI run against a real Gateway, skipped when
//! `EVALCTL_TEST_GATEWAY_URL` isn't set (no CI-provisioned Gateway by
//! default) — same skip-if-unreachable convention as the grounding CLI's
//! `MQK_DATABASE_URL`-gated tests.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn submit_then_status_round_trips_against_a_live_gateway() {
    let Ok(url) = std::env::var("EVALCTL_TEST_GATEWAY_URL") else {
        eprintln!("SKIP: EVALCTL_TEST_GATEWAY_URL not set");
        return;
    };

    let mut source = tempfile::NamedTempFile::new().unwrap();
    source.write_all(b"print('hi')").unwrap();

    let output = Command::cargo_bin("evalctl")
        .unwrap()
        .args(["--gateway-url", &url, "submit", "--source"])
        .arg(source.path())
        .args(["--language", "python3", "--timeout-s", "10"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = parsed["id"].as_str().unwrap();

    Command::cargo_bin("evalctl")
        .unwrap()
        .args(["--gateway-url", &url, "status", id])
        .assert()
        .success()
        .stdout(predicate::str::contains(id));
}
