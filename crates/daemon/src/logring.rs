// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded line-oriented ring buffer for driver output capture.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Default per-driver capture capacity, in lines.
pub const DEFAULT_CAPACITY: usize = 1000;

/// A bounded, line-oriented ring of captured output.
///
/// Writes are byte-oriented: incomplete lines are held in a partial
/// buffer until a newline arrives. Overflow silently discards the
/// oldest line.
pub struct LogRing {
    inner: Mutex<Inner>,
}

struct Inner {
    capacity: usize,
    lines: VecDeque<String>,
    partial: Vec<u8>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity: capacity.max(1),
                lines: VecDeque::new(),
                partial: Vec::new(),
            }),
        }
    }

    /// Append raw output bytes, splitting into lines on `\n`.
    pub fn write(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        inner.partial.extend_from_slice(bytes);
        while let Some(pos) = inner.partial.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = inner.partial.drain(..=pos).collect();
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if inner.lines.len() == inner.capacity {
                inner.lines.pop_front();
            }
            inner.lines.push_back(line);
        }
    }

    /// Up to the most recent `n` complete lines, oldest first.
    pub fn last(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock();
        let skip = inner.lines.len().saturating_sub(n);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "logring_tests.rs"]
mod tests;
