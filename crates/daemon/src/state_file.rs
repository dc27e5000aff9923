// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort on-disk adoption record.
//!
//! One JSON object mapping service name to the facts needed to re-adopt
//! a still-running process after a supervisor restart. The file is
//! advisory: absence or corruption is recoverable, and any mismatch at
//! adoption time causes a fresh start instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Persisted facts for one running service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Service kind: native, container, external
    pub kind: String,
    pub pid: u32,
    /// Effective port (0 when none)
    pub port: u16,
    /// Unix seconds when the incarnation started
    pub started_at: i64,
    /// Spec command line at start time
    pub command: String,
    /// Kernel start time of the process, for the PID-reuse guard
    pub start_time: u64,
}

/// Atomic, mutex-serialized writer for the adoption record.
pub struct StateFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records. Missing or corrupt files yield an empty map.
    pub fn load(&self) -> HashMap<String, StateRecord> {
        let _guard = self.lock.lock();
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "state file corrupt; ignoring");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable; ignoring");
                HashMap::new()
            }
        }
    }

    /// Insert or replace one record and rewrite the file.
    pub fn record(&self, name: &str, record: StateRecord) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load_unlocked();
        map.insert(name.to_string(), record);
        self.write_atomic(&map)
    }

    /// Drop one record and rewrite the file.
    pub fn remove(&self, name: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load_unlocked();
        if map.remove(name).is_some() {
            self.write_atomic(&map)?;
        }
        Ok(())
    }

    /// Remove every record (graceful full teardown).
    pub fn clear(&self) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        self.write_atomic(&HashMap::new())
    }

    fn load_unlocked(&self) -> HashMap<String, StateRecord> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Write via temp-file + rename, mode 0600.
    fn write_atomic(&self, map: &HashMap<String, StateRecord>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp, content)?;
        set_private(&tmp)?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[cfg(unix)]
fn set_private(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_private(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "state_file_tests.rs"]
mod tests;
