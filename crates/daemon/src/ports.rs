// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic port allocator: the single authority on port identity.
//!
//! Keys are service names, or compound `name__suffix` keys while a
//! blue/green deploy temporarily double-books a service. The two
//! mappings (key -> port, port -> key) are kept mutually consistent
//! under one mutex.

use std::collections::HashMap;
use std::net::TcpListener;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;

/// Random candidates probed before falling back to an exhaustive scan.
const RANDOM_ATTEMPTS: u32 = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("port range {min}-{max} exhausted")]
    Exhausted { min: u16, max: u16 },

    #[error("port {port} is already reserved by {key}")]
    InUse { port: u16, key: String },

    #[error("no allocation for key {0}")]
    UnknownKey(String),

    #[error("allocation already exists for key {0}")]
    KeyExists(String),
}

struct Inner {
    min: u16,
    max: u16,
    by_key: HashMap<String, u16>,
    by_port: HashMap<u16, String>,
}

pub struct PortAllocator {
    inner: Mutex<Inner>,
}

impl PortAllocator {
    /// Allocator over the inclusive range `[min, max]`.
    pub fn new(min: u16, max: u16) -> Self {
        Self {
            inner: Mutex::new(Inner { min, max, by_key: HashMap::new(), by_port: HashMap::new() }),
        }
    }

    /// Allocate a port for `name`. Idempotent: a second call for the same
    /// key returns the same port.
    ///
    /// Probes random candidates first, confirming each with a bind to
    /// `127.0.0.1`, then falls back to an exhaustive scan of the range.
    pub fn allocate(&self, name: &str) -> Result<u16, PortError> {
        let mut inner = self.inner.lock();
        if let Some(port) = inner.by_key.get(name) {
            return Ok(*port);
        }

        let span = inner.max.saturating_sub(inner.min) as u32 + 1;
        let mut rng = seed(name);
        for _ in 0..RANDOM_ATTEMPTS {
            rng = xorshift(rng);
            let candidate = inner.min + (rng % span as u64) as u16;
            if inner.by_port.contains_key(&candidate) {
                continue;
            }
            if host_port_free(candidate) {
                inner.by_key.insert(name.to_string(), candidate);
                inner.by_port.insert(candidate, name.to_string());
                return Ok(candidate);
            }
        }

        // Exhaustive scan
        for candidate in inner.min..=inner.max {
            if inner.by_port.contains_key(&candidate) {
                continue;
            }
            if host_port_free(candidate) {
                inner.by_key.insert(name.to_string(), candidate);
                inner.by_port.insert(candidate, name.to_string());
                return Ok(candidate);
            }
        }

        Err(PortError::Exhausted { min: inner.min, max: inner.max })
    }

    /// Restore a prior allocation, e.g. from the state file during
    /// adoption. Fails only if the port already belongs to another key.
    pub fn reserve(&self, name: &str, port: u16) -> Result<(), PortError> {
        let mut inner = self.inner.lock();
        if let Some(owner) = inner.by_port.get(&port) {
            if owner != name {
                return Err(PortError::InUse { port, key: owner.clone() });
            }
            return Ok(());
        }
        // Drop any previous allocation for this key first
        if let Some(old) = inner.by_key.remove(name) {
            inner.by_port.remove(&old);
        }
        inner.by_key.insert(name.to_string(), port);
        inner.by_port.insert(port, name.to_string());
        Ok(())
    }

    /// Free both mappings for `name`. Unknown keys are a no-op.
    pub fn release(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(port) = inner.by_key.remove(name) {
            inner.by_port.remove(&port);
        }
    }

    /// Allocate under the compound key `name__suffix`.
    pub fn allocate_temporary(&self, name: &str, suffix: &str) -> Result<u16, PortError> {
        self.allocate(&compound_key(name, suffix))
    }

    /// Atomically move an allocation from one key to another.
    pub fn reassign(&self, from: &str, to: &str) -> Result<(), PortError> {
        let mut inner = self.inner.lock();
        if inner.by_key.contains_key(to) {
            return Err(PortError::KeyExists(to.to_string()));
        }
        let port = inner
            .by_key
            .remove(from)
            .ok_or_else(|| PortError::UnknownKey(from.to_string()))?;
        inner.by_key.insert(to.to_string(), port);
        inner.by_port.insert(port, to.to_string());
        Ok(())
    }

    /// Port bound to `name`, or 0 when absent.
    pub fn port(&self, name: &str) -> u16 {
        self.inner.lock().by_key.get(name).copied().unwrap_or(0)
    }
}

/// Compound key used while a deploy double-books a service.
pub fn compound_key(name: &str, suffix: &str) -> String {
    format!("{}__{}", name, suffix)
}

/// Confirm the host OS does not currently hold the candidate port.
fn host_port_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

fn seed(name: &str) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let name_bits = name.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    (nanos ^ name_bits) | 1
}

fn xorshift(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
