#![cfg(unix)]

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const FAKE_ANNOTATE: &str = r#"#!/bin/sh
case "$2" in
  *missing*) echo "not found" >&2; exit 1 ;;
esac
printf 'alice cs:1 one\nbob cs:2 two\ncarol cs:3 three\n'
"#;

fn fake_annotate(dir: &Path) -> PathBuf {
    let script = dir.join("fake-cm");
    fs::write(&script, FAKE_ANNOTATE).expect("write script");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    script
}

#[allow(deprecated)]
fn run_session(events: &str) -> Vec<Value> {
    let temp = tempdir().expect("tempdir");
    let script = fake_annotate(temp.path());

    let output = Command::cargo_bin("inline-blame")
        .expect("binary")
        .current_dir(temp.path())
        .env_remove("INLINE_BLAME_DEBOUNCE_MS")
        .env_remove("INLINE_BLAME_MAX_ANNOTATE")
        .args(["--quiet", "--debounce-ms", "500", "--annotate-program"])
        .arg(&script)
        .arg("session")
        .write_stdin(events)
        .output()
        .expect("session run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8(output.stdout)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json reply"))
        .collect()
}

fn replies_of<'a>(replies: &'a [Value], kind: &str) -> Vec<&'a Value> {
    replies
        .iter()
        .filter(|reply| reply["reply"] == kind)
        .collect()
}

#[test]
fn cursor_event_yields_attribution() {
    let replies = run_session("{\"event\":\"cursor\",\"file\":\"/w/a.rs\",\"line\":2}\n");
    let attributions = replies_of(&replies, "attribution");
    assert_eq!(attributions.len(), 1);
    assert_eq!(attributions[0]["file"], "/w/a.rs");
    assert_eq!(attributions[0]["text"], "bob • cs:2");
}

#[test]
fn failed_annotate_yields_unavailable() {
    let replies = run_session("{\"event\":\"cursor\",\"file\":\"/w/missing.rs\",\"line\":1}\n");
    let unavailable = replies_of(&replies, "unavailable");
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0]["file"], "/w/missing.rs");
    assert!(replies_of(&replies, "attribution").is_empty());
}

#[test]
fn control_events_reply_in_order() {
    let events = concat!(
        "garbage\n",
        "{\"event\":\"clear\"}\n",
        "{\"event\":\"stats\"}\n",
    );
    let replies = run_session(events);
    let kinds: Vec<_> = replies
        .iter()
        .map(|reply| reply["reply"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["error", "notice", "stats"]);
    assert_eq!(replies[1]["message"], "blame cache cleared");
    assert_eq!(replies[2]["invalidations"], 1);
}

#[test]
fn closed_file_reports_nothing() {
    let events = concat!(
        "{\"event\":\"cursor\",\"file\":\"/w/a.rs\",\"line\":1}\n",
        "{\"event\":\"close\",\"file\":\"/w/a.rs\"}\n",
    );
    let replies = run_session(events);
    assert!(replies_of(&replies, "attribution").is_empty());
    assert!(replies_of(&replies, "unavailable").is_empty());
}
