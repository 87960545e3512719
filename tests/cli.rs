//! End-to-end tests of the `shelf` binary that need no backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[remote]
base_url = "{}"
timeout_secs = 2

[storage]
path = "{}/data/shelf.sqlite"

[chat]
response_length = "short"
"#,
        base_url,
        root.display()
    );

    let config_path = config_dir.join("docshelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_shelf"))
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .expect("failed to run shelf binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_cached_listing_on_fresh_database() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:1");

    let (stdout, stderr, success) = run_shelf(&config_path, &["libraries", "--cached"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No libraries."));
    assert!(tmp.path().join("data").join("shelf.sqlite").exists());

    let (_, stderr, success) = run_shelf(&config_path, &["conversations", "--cached"]);
    assert!(success, "stderr={}", stderr);
}

#[test]
fn test_unreachable_backend_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1");

    let (_, stderr, success) = run_shelf(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("network error"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env("localhost:8000");

    let (_, stderr, success) = run_shelf(&config_path, &["libraries", "--cached"]);
    assert!(!success);
    assert!(stderr.contains("base_url"), "stderr={}", stderr);
}

#[test]
fn test_unknown_response_length_is_rejected() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1");

    let (_, stderr, success) = run_shelf(
        &config_path,
        &["ask", "0f8fad5b-d9cb-469f-a165-70867728950e", "Why?", "--length", "huge"],
    );
    assert!(!success);
    assert!(stderr.contains("Unknown response length"), "stderr={}", stderr);
}
