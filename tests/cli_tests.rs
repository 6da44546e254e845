use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::process::{Command, Output};

/// Integration tests for starmirror CLI commands
/// These tests run the built binary and verify its behavior

fn starmirror(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_starmirror"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute starmirror")
}

fn write_config(temp_dir: &TempDir, root: &str) -> String {
    let config = temp_dir.child("config.yml");
    config
        .write_str(&format!(
            "root_directory: \"{}\"\nlogging:\n  level: \"warn\"\n",
            root
        ))
        .unwrap();
    config.path().display().to_string()
}

#[test]
fn test_cli_help() {
    let output = starmirror(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    for command in ["sync", "list", "ledger", "doctor"] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_sync_help_lists_policy_flags() {
    let output = starmirror(&["sync", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let flags = predicate::str::contains("--errexit")
        .and(predicate::str::contains("--errbreak"))
        .and(predicate::str::contains("--no-wiki"))
        .and(predicate::str::contains("--api-pages"));
    assert!(flags.eval(stdout.as_ref()));
}

#[test]
fn test_cli_version() {
    let output = starmirror(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("starmirror"));
}

#[test]
fn test_errexit_conflicts_with_errbreak() {
    let output = starmirror(&["sync", "--errexit", "--errbreak"]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_config_file_fails() {
    let output = starmirror(&["--config", "/nonexistent/starmirror/config.yml", "ledger"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.child("config.yml");
    config.write_str("sync:\n  error_policy: \"sometimes\"\n").unwrap();

    let output = starmirror(&["--config", &config.path().display().to_string(), "ledger"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config file"));
}

#[test]
fn test_ledger_command_reports_entries() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.child("stars");
    root.child("Go/acme@widget/.git").create_dir_all().unwrap();
    root.child("cloned_repos.json")
        .write_str(r#"["acme@widget", "octo@gone"]"#)
        .unwrap();

    let config = write_config(&temp_dir, &root.path().display().to_string());
    let output = starmirror(&["--config", &config, "ledger"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 entries"));
    assert!(stdout.contains("✅ acme@widget"));
    assert!(stdout.contains("octo@gone (no mirror on disk)"));
}

#[test]
fn test_ledger_command_creates_empty_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.child("stars");
    root.create_dir_all().unwrap();

    let config = write_config(&temp_dir, &root.path().display().to_string());
    let output = starmirror(&["--config", &config, "ledger"]);

    assert!(output.status.success());
    root.child("cloned_repos.json").assert("[]");
}

#[test]
fn test_root_flag_overrides_config() {
    let temp_dir = TempDir::new().unwrap();
    let configured = temp_dir.child("configured");
    let flagged = temp_dir.child("flagged");
    configured.create_dir_all().unwrap();
    flagged.create_dir_all().unwrap();

    let config = write_config(&temp_dir, &configured.path().display().to_string());
    let output = starmirror(&[
        "--config",
        &config,
        "--root",
        &flagged.path().display().to_string(),
        "ledger",
    ]);

    assert!(output.status.success());
    flagged.child("cloned_repos.json").assert(predicate::path::exists());
    configured
        .child("cloned_repos.json")
        .assert(predicate::path::missing());
}

#[test]
fn test_doctor_command() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, &temp_dir.path().display().to_string());
    let output = starmirror(&["--config", &config, "doctor"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("System Diagnostics"));
    assert!(stdout.contains("Git Installation"));
    assert!(stdout.contains("Ledger"));
}

#[test]
fn test_doctor_checks_token_flag_and_counts_warnings() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.child("stars");
    let config = write_config(&temp_dir, &root.path().display().to_string());
    let output = starmirror(&["--config", &config, "doctor", "--token", "ghp_flag"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("GitHub credentials found"));
    assert!(stdout.contains("Strategy: Explicit"));
    // Missing root and missing ledger are both warnings
    assert!(stdout.contains("(2 warnings)"));
}

/// Config whose API base points at a closed local port
fn write_unreachable_api_config(temp_dir: &TempDir) -> String {
    let root = temp_dir.child("stars");
    let config = temp_dir.child("offline.yml");
    config
        .write_str(&format!(
            "root_directory: \"{}\"\ngithub:\n  api_base_url: \"http://127.0.0.1:1\"\n  page_cooldown_ms: 0\nlogging:\n  level: \"error\"\n",
            root.path().display()
        ))
        .unwrap();
    config.path().display().to_string()
}

#[test]
fn test_empty_listing_fails_under_errexit() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_unreachable_api_config(&temp_dir);
    let output = starmirror(&[
        "--config", &config, "sync", "--token", "dummy", "--username", "octo", "--no-wiki",
        "--errexit",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No repositories found or error fetching data."));
}

#[test]
fn test_empty_listing_is_reported_without_errexit() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_unreachable_api_config(&temp_dir);
    let output = starmirror(&[
        "--config", &config, "sync", "--token", "dummy", "--username", "octo", "--no-wiki",
    ]);

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No repositories found or error fetching data."));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("All repositories processed"));
}
