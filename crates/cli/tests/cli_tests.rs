//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "kre-cli", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Historical container resource usage"),
        "Should show app description"
    );
    assert!(stdout.contains("historical"), "Should show historical command");
    assert!(stdout.contains("--kubeconfig"), "Should show kubeconfig option");
    assert!(stdout.contains("--context"), "Should show context option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "kre-cli", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(
        stdout.contains("kube-resource-explorer"),
        "Should show binary name"
    );
}

/// Test historical subcommand help
#[test]
fn test_historical_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "kre-cli", "--", "historical", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Historical help should succeed");
    assert!(stdout.contains("--metric"), "Should show metric option");
    assert!(stdout.contains("--duration"), "Should show duration option");
    assert!(stdout.contains("--sort"), "Should show sort option");
    assert!(stdout.contains("--reverse"), "Should show reverse option");
    assert!(
        stdout.contains("--prometheus-namespace"),
        "Should show prometheus namespace option"
    );
}

/// Test that an unknown metric is rejected before any cluster access
#[test]
fn test_historical_rejects_unknown_metric() {
    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "kre-cli",
            "--",
            "historical",
            "--metric",
            "disk",
        ])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Unknown metric should fail");
    assert!(stderr.contains("unknown metric kind"), "Should explain the error");
}

/// Test that a malformed duration is rejected
#[test]
fn test_historical_rejects_bad_duration() {
    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "kre-cli",
            "--",
            "historical",
            "--metric",
            "cpu",
            "--duration",
            "5w",
        ])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Bad duration should fail");
}

/// Test that sorting memory by average is rejected before any cluster access
#[test]
fn test_historical_rejects_memory_average_sort() {
    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "kre-cli",
            "--",
            "historical",
            "--metric",
            "memory",
            "--sort",
            "avg",
            "--kubeconfig",
            "/nonexistent/kubeconfig",
        ])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Memory average sort should fail");
    assert!(stderr.contains("no average"), "Should explain the error");
}

/// Test that csv is an accepted output format
#[test]
fn test_cli_help_lists_csv_format() {
    let output = Command::new("cargo")
        .args(["run", "-p", "kre-cli", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("csv"), "Should list csv format");
}
