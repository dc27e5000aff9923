// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adopted driver: supervision of a process started by a previous
//! supervisor incarnation.
//!
//! There is no stdio attachment and no log capture; liveness is observed
//! with a zero-signal probe. The PID-reuse guard runs at attach time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{pidinfo, Driver, DriverError, DriverShared, DriverState, ProcessInfo, KILL_REAP_WAIT};

/// Liveness probe interval while running.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Aggressive poll interval while stopping.
const STOP_POLL: Duration = Duration::from_millis(50);

pub struct AdoptedDriver {
    pid: i32,
    shared: Arc<DriverShared>,
    started: AtomicBool,
}

impl AdoptedDriver {
    /// Attach to an existing PID, rejecting when the process is gone or
    /// its identity no longer matches the recorded facts.
    pub fn attach(
        pid: u32,
        recorded_command: &str,
        recorded_start_time: u64,
        started_at: DateTime<Utc>,
    ) -> Result<Self, DriverError> {
        if !alive(pid as i32) {
            return Err(DriverError::NoSuchProcess(pid));
        }

        let ident = pidinfo::process_ident(pid).ok_or_else(|| {
            DriverError::AdoptionRejected(format!("cannot read identity of pid {}", pid))
        })?;
        if ident.start_time != recorded_start_time {
            return Err(DriverError::AdoptionRejected(format!(
                "pid {} start time {} does not match recorded {} (pid reused?)",
                pid, ident.start_time, recorded_start_time
            )));
        }
        let expected = pidinfo::command_short_name(recorded_command);
        if !expected.is_empty() && ident.comm != expected {
            return Err(DriverError::AdoptionRejected(format!(
                "pid {} runs {:?}, record says {:?}",
                pid, ident.comm, expected
            )));
        }

        let shared = DriverShared::new();
        shared.set_pid(pid, started_at);
        Ok(Self { pid: pid as i32, shared, started: AtomicBool::new(false) })
    }
}

#[async_trait]
impl Driver for AdoptedDriver {
    async fn start(&self) -> Result<(), DriverError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Start("driver already used".to_string()));
        }
        if !alive(self.pid) {
            self.shared.record_exit(1, Some("process exited".to_string()), DriverState::Stopped);
            return Err(DriverError::NoSuchProcess(self.pid as u32));
        }

        self.shared.set_state(DriverState::Running);
        debug!(pid = self.pid, "adopted process under supervision");

        let pid = self.pid;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(LIVENESS_INTERVAL).await;
                if shared.is_done() {
                    return;
                }
                if !alive(pid) {
                    shared.record_exit(1, Some("process exited".to_string()), DriverState::Stopped);
                    return;
                }
            }
        });
        Ok(())
    }

    async fn stop(&self, timeout: Duration) -> Result<(), DriverError> {
        if self.shared.is_done() {
            return Ok(());
        }
        self.shared.set_state(DriverState::Stopping);

        let _ = kill(Pid::from_raw(self.pid), Signal::SIGTERM);
        if self.poll_gone(timeout).await {
            self.shared.record_exit(1, Some("process exited".to_string()), DriverState::Stopped);
            return Ok(());
        }

        debug!(pid = self.pid, "graceful stop timed out; sending KILL");
        let _ = kill(Pid::from_raw(self.pid), Signal::SIGKILL);
        if !self.poll_gone(KILL_REAP_WAIT).await {
            warn!(pid = self.pid, "adopted process survived KILL");
        }
        self.shared.record_exit(1, Some("process exited".to_string()), DriverState::Stopped);
        Ok(())
    }

    async fn wait(&self) -> i32 {
        self.shared.wait_done().await
    }

    /// No stdio attachment: adopted processes have no captured output.
    fn log_lines(&self, _n: usize) -> Vec<String> {
        Vec::new()
    }

    fn info(&self) -> ProcessInfo {
        self.shared.info()
    }
}

impl AdoptedDriver {
    async fn poll_gone(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !alive(self.pid) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(STOP_POLL).await;
        }
    }
}

/// Zero-signal liveness probe.
fn alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
#[path = "adopted_tests.rs"]
mod tests;
