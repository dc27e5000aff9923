// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native driver: a child process in its own process group.
//!
//! Signals go to the group so the whole subtree terminates together.
//! stdout/stderr are captured into the bounded log ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    stream_into_ring, Driver, DriverError, DriverShared, DriverState, ProcessInfo, KILL_REAP_WAIT,
};
use crate::logring::LogRing;

pub struct NativeDriver {
    command: String,
    env: Vec<(String, String)>,
    ring: Arc<LogRing>,
    shared: Arc<DriverShared>,
    pgid: Mutex<Option<i32>>,
    started: AtomicBool,
}

impl NativeDriver {
    pub fn new(command: impl Into<String>, env: Vec<(String, String)>) -> Self {
        Self {
            command: command.into(),
            env,
            ring: Arc::new(LogRing::default()),
            shared: DriverShared::new(),
            pgid: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Driver for NativeDriver {
    async fn start(&self) -> Result<(), DriverError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Start("driver already used".to_string()));
        }

        let argv: Vec<&str> = self.command.split_whitespace().collect();
        let Some((program, args)) = argv.split_first() else {
            let msg = "empty command".to_string();
            self.shared.record_exit(-1, Some(msg.clone()), DriverState::Failed);
            return Err(DriverError::Start(msg));
        };

        self.shared.set_state(DriverState::Starting);

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .envs(self.env.iter().cloned())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .process_group(0)
            .kill_on_drop(false);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let msg = format!("spawn {}: {}", program, e);
                self.shared.record_exit(-1, Some(msg.clone()), DriverState::Failed);
                return Err(DriverError::Start(msg));
            }
        };

        let pid = child.id().unwrap_or_default();
        self.shared.set_pid(pid, Utc::now());
        *self.pgid.lock() = Some(pid as i32);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(stream_into_ring(stdout, Arc::clone(&self.ring)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(stream_into_ring(stderr, Arc::clone(&self.ring)));
        }

        self.shared.set_state(DriverState::Running);
        debug!(command = %self.command, pid, "native process started");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    let code = exit_code(status);
                    shared.record_exit(code, None, DriverState::Stopped);
                }
                Err(e) => {
                    shared.record_exit(-1, Some(format!("wait: {}", e)), DriverState::Stopped);
                }
            }
        });

        Ok(())
    }

    async fn stop(&self, timeout: Duration) -> Result<(), DriverError> {
        if self.shared.is_done() {
            return Ok(());
        }
        let Some(pgid) = *self.pgid.lock() else {
            self.shared.record_exit(-1, None, DriverState::Stopped);
            return Ok(());
        };

        self.shared.set_state(DriverState::Stopping);
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGTERM);

        if self.shared.wait_done_timeout(timeout).await {
            return Ok(());
        }

        debug!(pgid, "graceful stop timed out; sending KILL");
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);

        // Hard cap on blocking: surface Stopped even if waitpid has not
        // returned (e.g. the child is stuck in uninterruptible sleep).
        if !self.shared.wait_done_timeout(KILL_REAP_WAIT).await {
            warn!(pgid, "process not reaped after KILL");
            self.shared.record_exit(-1, Some("process not reaped after KILL".to_string()), DriverState::Stopped);
        }
        Ok(())
    }

    async fn wait(&self) -> i32 {
        self.shared.wait_done().await
    }

    fn log_lines(&self, n: usize) -> Vec<String> {
        self.ring.last(n)
    }

    fn info(&self) -> ProcessInfo {
        self.shared.info()
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;
