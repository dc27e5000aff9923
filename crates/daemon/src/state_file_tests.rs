// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn record(pid: u32, port: u16) -> StateRecord {
    StateRecord {
        kind: "native".to_string(),
        pid,
        port,
        started_at: 1_700_000_000,
        command: "sleep 300".to_string(),
        start_time: 42,
    }
}

fn state_file(dir: &tempfile::TempDir) -> StateFile {
    StateFile::new(dir.path().join("state.json"))
}

#[test]
fn record_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.record("web", record(100, 8080)).unwrap();
    state.record("db", record(200, 5432)).unwrap();

    let map = state.load();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("web"), Some(&record(100, 8080)));
}

#[test]
fn record_replaces_existing_entry() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.record("web", record(100, 8080)).unwrap();
    state.record("web", record(101, 8081)).unwrap();
    assert_eq!(state.load().get("web").map(|r| r.pid), Some(101));
}

#[test]
fn remove_drops_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.record("a", record(1, 0)).unwrap();
    state.record("b", record(2, 0)).unwrap();
    state.remove("a").unwrap();
    let map = state.load();
    assert!(!map.contains_key("a"));
    assert!(map.contains_key("b"));
}

#[test]
fn remove_missing_entry_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.remove("ghost").unwrap();
}

#[test]
fn clear_empties_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.record("a", record(1, 0)).unwrap();
    state.clear().unwrap();
    assert!(state.load().is_empty());
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(state_file(&dir).load().is_empty());
}

#[test]
fn corrupt_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    std::fs::write(state.path(), "{not json").unwrap();
    assert!(state.load().is_empty());
}

#[cfg(unix)]
#[test]
fn file_mode_is_0600() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.record("a", record(1, 0)).unwrap();
    let mode = std::fs::metadata(state.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn written_file_is_pretty_printed() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_file(&dir);
    state.record("a", record(1, 0)).unwrap();
    let content = std::fs::read_to_string(state.path()).unwrap();
    assert!(content.contains('\n'));
}
