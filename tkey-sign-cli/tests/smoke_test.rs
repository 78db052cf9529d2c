//! Smoke tests for tkey-sign
//!
//! These tests run the binary without a TKey attached.

use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tkey-sign"))
        .args(args)
        .env_remove("TKEY_SIGN_PORT")
        .env_remove("TKEY_SIGN_APP")
        .output()
        .expect("Failed to execute tkey-sign")
}

/// Test that the CLI can show help
#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(
        stdout.contains("sign"),
        "Help should mention 'sign' command"
    );
    assert!(
        stdout.contains("verify"),
        "Help should mention 'verify' command"
    );
}

/// Test that version is shown
#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("tkey-sign"));
}

/// Usage errors exit with 2
#[test]
fn test_verify_needs_three_files() {
    let output = run_cli(&["verify", "message.txt"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_uss_flags_are_exclusive() {
    let output = run_cli(&["sign", "--uss", "--uss-file", "-", "message.txt"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unknown_framing_rejected() {
    let output = run_cli(&["verify", "--framing", "sha3", "a", "b", "c"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("unknown framing"));
}

/// A missing message fails before any device is contacted
#[test]
fn test_sign_missing_file() {
    let output = run_cli(&[
        "sign",
        "--port",
        "/nonexistent/tty",
        "/nonexistent/message",
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(!stderr.contains("Connecting to TKey"));
}
