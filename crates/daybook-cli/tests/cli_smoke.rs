//! CLI end-to-end tests.
//!
//! Each test runs the built `daybook` binary against a throwaway HOME so the
//! config file and database live in a temp directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_daybook"))
        .args(args)
        .env("HOME", home)
        .env_remove("DAYBOOK_ENV")
        .env_remove("DAYBOOK_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).expect("stdout is JSON")
}

#[test]
fn test_config_set_and_get() {
    let home = tempfile::tempdir().unwrap();

    let (out, _, code) = run_cli(home.path(), &["config", "set", "feed.page_size", "5"]);
    assert_eq!(code, 0);
    assert_eq!(out.trim(), "ok");

    let (out, _, code) = run_cli(home.path(), &["config", "get", "feed.page_size"]);
    assert_eq!(code, 0);
    assert_eq!(out.trim(), "5");

    let (_, err, code) = run_cli(home.path(), &["config", "set", "timezone", "Mars/Olympus"]);
    assert_eq!(code, 1);
    assert!(err.contains("error:"));
}

#[test]
fn test_requires_viewer() {
    let home = tempfile::tempdir().unwrap();
    let (_, err, code) = run_cli(home.path(), &["status"]);
    assert_eq!(code, 1);
    assert!(err.contains("--as"));
}

#[test]
fn test_post_unlocks_feed() {
    let home = tempfile::tempdir().unwrap();

    let (out, _, code) = run_cli(home.path(), &["--as", "alice", "status"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["state"], "NEEDS_POST");

    let (_, err, code) = run_cli(home.path(), &["--as", "alice", "feed"]);
    assert_eq!(code, 1);
    assert!(err.contains("locked"));

    let (out, _, code) = run_cli(
        home.path(),
        &[
            "--as", "alice", "post", "--title", "Morning run", "--bullet", "5k",
            "--chip", "steps:9000",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(json(&out)["outcome"], "created");

    let (out, _, code) = run_cli(home.path(), &["--as", "alice", "status"]);
    assert_eq!(code, 0);
    let status = json(&out);
    assert_eq!(status["state"], "FEED_UNLOCKED");
    assert_eq!(status["editable"], true);
    assert_eq!(status["today_entry"]["title"], "Morning run");

    let (out, _, code) = run_cli(home.path(), &["--as", "alice", "post", "--title", "Again"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["outcome"], "updated");

    let (out, _, code) = run_cli(home.path(), &["--as", "alice", "feed", "--filter", "all"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["filter"], "all");
}

#[test]
fn test_feed_shows_friend_entry() {
    let home = tempfile::tempdir().unwrap();

    let (_, _, code) = run_cli(home.path(), &["--as", "bob", "post", "--title", "Bob's day"]);
    assert_eq!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["--as", "alice", "social", "friend", "bob"]);
    assert_eq!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["--as", "alice", "post", "--title", "Alice's day"]);
    assert_eq!(code, 0);

    let (out, _, code) = run_cli(home.path(), &["--as", "alice", "feed", "--filter", "friends"]);
    assert_eq!(code, 0);
    let listing = json(&out);
    let items = listing["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["user_id"], "bob");
    assert_eq!(listing["new_impressions"], 1);

    let entry_id = items[0]["id"].as_str().unwrap().to_string();
    let (_, _, code) = run_cli(home.path(), &["--as", "alice", "kudos", &entry_id]);
    assert_eq!(code, 0);

    let (out, _, _) = run_cli(home.path(), &["--as", "alice", "feed", "--filter", "friends"]);
    let listing = json(&out);
    assert_eq!(listing["items"][0]["kudos_count"], 1);
    assert_eq!(listing["items"][0]["has_kudos"], true);

    let (out, _, code) = run_cli(home.path(), &["--as", "bob", "stats"]);
    assert_eq!(code, 0);
    let stats = json(&out);
    assert_eq!(stats["total_entries"], 1);
    assert_eq!(stats["kudos_received"], 1);
}

#[test]
fn test_draft_round_trip() {
    let home = tempfile::tempdir().unwrap();

    let (_, _, code) = run_cli(
        home.path(),
        &["--as", "alice", "draft", "save", "--title", "Half done"],
    );
    assert_eq!(code, 0);

    let (out, _, code) = run_cli(home.path(), &["--as", "alice", "draft", "show"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["data"]["title"], "Half done");

    let (_, _, code) = run_cli(home.path(), &["--as", "alice", "post", "--bullet", "finished"]);
    assert_eq!(code, 0);

    let (out, _, _) = run_cli(home.path(), &["--as", "alice", "status"]);
    assert_eq!(json(&out)["today_entry"]["title"], "Half done");

    let (out, _, _) = run_cli(home.path(), &["--as", "alice", "draft", "show"]);
    assert_eq!(out.trim(), "null");
}
