//! CLI end-to-end tests
//!
//! Tests for the mediameta command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the mediameta binary
#[allow(deprecated)]
fn mediameta_cmd() -> Command {
    Command::cargo_bin("mediameta").unwrap()
}

/// 0.1 s of 16-bit stereo PCM titled "Take 1".
fn wave_bytes() -> Vec<u8> {
    fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&44_100u32.to_le_bytes());
    fmt.extend_from_slice(&176_400u32.to_le_bytes());
    fmt.extend_from_slice(&4u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let mut info = b"INFO".to_vec();
    info.extend(chunk(b"INAM", b"Take 1"));

    let mut body = b"WAVE".to_vec();
    body.extend(chunk(b"fmt ", &fmt));
    body.extend(chunk(b"LIST", &info));
    body.extend(chunk(b"data", &[0u8; 17_640]));

    let mut file = b"RIFF".to_vec();
    file.extend_from_slice(&(body.len() as u32).to_le_bytes());
    file.extend(body);
    file
}

fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = mediameta_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = mediameta_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediameta"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = mediameta_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediameta"));
}

#[test]
fn test_cli_extract_help() {
    let mut cmd = mediameta_cmd();
    cmd.args(["extract", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Extract canonical attributes"));
}

#[test]
fn test_cli_extract_wave() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "take.wav", &wave_bytes());

    let mut cmd = mediameta_cmd();
    cmd.arg("extract")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Container: WAVE"))
        .stdout(predicate::str::contains("Status: success"))
        .stdout(predicate::str::contains("Take 1"))
        .stdout(predicate::str::contains("duration-seconds"));
}

#[test]
fn test_cli_extract_json() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "take.wav", &wave_bytes());

    let output = mediameta_cmd()
        .args(["extract", "--json", "--jobs", "2"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let report = &reports[0];
    assert_eq!(report["status"], "success");
    assert_eq!(report["container"], "wave");
    assert_eq!(report["attributes"]["sample-rate"], 44100.0);
    assert_eq!(report["attributes"]["title"], "Take 1");
}

#[test]
fn test_cli_extract_unknown_is_success() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "notes.txt", b"just some text, not media at all");

    let mut cmd = mediameta_cmd();
    cmd.arg("extract")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Container: Unknown"));
}

#[test]
fn test_cli_extract_nonexistent_file() {
    let mut cmd = mediameta_cmd();
    cmd.args(["extract", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_cli_extract_zero_budget_fails() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "take.wav", &wave_bytes());

    let mut cmd = mediameta_cmd();
    cmd.args(["extract", "--budget-ms", "0"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout"));
}

#[test]
fn test_cli_sniff_ignores_extension() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "mislabelled.mp4", &wave_bytes());

    let mut cmd = mediameta_cmd();
    cmd.arg("sniff")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("WAVE (wave)"));
}

#[test]
fn test_cli_records_shows_raw_keys() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "take.wav", &wave_bytes());

    let mut cmd = mediameta_cmd();
    cmd.arg("records")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("fmt:byte-rate = 176400"))
        .stdout(predicate::str::contains("info:INAM"));
}

#[test]
fn test_cli_vocab_lists_every_attribute() {
    let mut cmd = mediameta_cmd();
    cmd.arg("vocab")
        .assert()
        .success()
        .stdout(predicate::str::contains("duration-seconds"))
        .stdout(predicate::str::contains("has-artwork"))
        .stdout(predicate::str::contains("boolean"));
}

#[test]
fn test_cli_validate_defaults() {
    let mut cmd = mediameta_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_cli_validate_config_file() {
    let temp = tempdir().unwrap();
    let config_file = write_fixture(
        temp.path(),
        "config.json",
        br#"{
            "limits": { "time_budget_ms": 2000 },
            "rules": [{ "key": "vorbis:MOOD", "target": "comment" }]
        }"#,
    );

    let mut cmd = mediameta_cmd();
    cmd.arg("validate")
        .arg(&config_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("2000 ms"))
        .stdout(predicate::str::contains("Extra rules: 1"));
}

#[test]
fn test_cli_validate_rejects_mistyped_rule() {
    let temp = tempdir().unwrap();
    let config_file = write_fixture(
        temp.path(),
        "config.json",
        br#"{ "rules": [{ "key": "vorbis:MOOD", "target": "width", "coercion": { "kind": "genre" } }] }"#,
    );

    let mut cmd = mediameta_cmd();
    cmd.args(["--config"])
        .arg(&config_file)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("width"));
}

#[test]
fn test_cli_validate_invalid_json() {
    let temp = tempdir().unwrap();
    let config_file = write_fixture(temp.path(), "config.json", b"{ not json");

    let mut cmd = mediameta_cmd();
    cmd.arg("validate")
        .arg(&config_file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}
