// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret store consumed by the supervisor at service start time.
//!
//! The supervisor only reads (`get`, `get_multiple`); the write methods
//! exist for the CLI front-end. The file-backed implementation keeps a
//! plain key/value map at mode 0600 with atomic rewrites.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Narrow interface between the supervisor and secret storage.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> std::io::Result<bool>;

    fn list(&self) -> Vec<String>;

    /// Present subset of `keys`.
    fn get_multiple(&self, keys: &[String]) -> HashMap<String, String> {
        keys.iter()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }
}

/// File-backed store: `secrets.json` in the state directory.
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    fn read(&self) -> BTreeMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn write_atomic(&self, map: &BTreeMap<String, String>) -> std::io::Result<()> {
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

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read();
        map.insert(key.to_string(), value.to_string());
        self.write_atomic(&map)
    }

    fn delete(&self, key: &str) -> std::io::Result<bool> {
        let _guard = self.lock.lock();
        let mut map = self.read();
        let existed = map.remove(key).is_some();
        if existed {
            self.write_atomic(&map)?;
        }
        Ok(existed)
    }

    fn list(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        self.read().into_keys().collect()
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

/// In-memory store for tests.
#[cfg(test)]
pub(crate) struct MemorySecretStore {
    map: Mutex<BTreeMap<String, String>>,
}

#[cfg(test)]
impl MemorySecretStore {
    pub fn new() -> Self {
        Self { map: Mutex::new(BTreeMap::new()) }
    }

    pub fn with(entries: &[(&str, &str)]) -> Self {
        let store = Self::new();
        for (k, v) in entries {
            let _ = store.set(k, v);
        }
        store
    }
}

#[cfg(test)]
impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> std::io::Result<bool> {
        Ok(self.map.lock().remove(key).is_some())
    }

    fn list(&self) -> Vec<String> {
        self.map.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
