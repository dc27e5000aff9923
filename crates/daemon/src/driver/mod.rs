// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver abstraction: a uniform lifecycle handle over one process
//! incarnation.
//!
//! A driver is used exactly once: start it, optionally stop it, wait for
//! it. State transitions are monotone within that lifetime; a driver
//! that reached `Stopped` or `Failed` is never reused — the supervision
//! state machine constructs a fresh driver per incarnation.

pub mod adopted;
pub mod container;
pub mod native;
pub mod pidinfo;

pub use adopted::AdoptedDriver;
pub use container::ContainerDriver;
pub use native::NativeDriver;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

/// Small allowance past a requested stop timeout before the caller gives
/// up on a driver ever reporting terminal.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for a reap after escalating to KILL.
pub(crate) const KILL_REAP_WAIT: Duration = Duration::from_secs(1);

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriverState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Stopped => "stopped",
            DriverState::Starting => "starting",
            DriverState::Running => "running",
            DriverState::Stopping => "stopping",
            DriverState::Failed => "failed",
        }
    }
}

/// Point-in-time snapshot of a driver.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub state: DriverState,
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to start: {0}")]
    Start(String),

    #[error("no such process: pid {0}")]
    NoSuchProcess(u32),

    #[error("adoption rejected: {0}")]
    AdoptionRejected(String),
}

/// Uniform lifecycle handle over native-exec, container, and adopted-PID
/// backends.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Launch the process. Returns once the driver is `Running` or
    /// `Failed`.
    async fn start(&self) -> Result<(), DriverError>;

    /// Graceful termination request, forced after `timeout`. Idempotent;
    /// returns within `timeout` plus a small grace even if the process
    /// is unreapable.
    async fn stop(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Block until the process reaches a terminal state; returns its
    /// exit code.
    async fn wait(&self) -> i32;

    /// Up to the last `n` captured output lines (oldest first). Empty
    /// for adopted drivers, which cannot attach to open descriptors.
    fn log_lines(&self, n: usize) -> Vec<String>;

    fn info(&self) -> ProcessInfo;
}

/// State shared between a driver handle and its background tasks.
pub(crate) struct DriverShared {
    inner: Mutex<SharedInner>,
    done_tx: watch::Sender<bool>,
}

struct SharedInner {
    info: ProcessInfo,
    /// Terminal outcome recorded; later transitions are ignored
    done: bool,
}

impl DriverShared {
    pub(crate) fn new() -> Arc<Self> {
        let (done_tx, _) = watch::channel(false);
        Arc::new(Self {
            inner: Mutex::new(SharedInner { info: ProcessInfo::default(), done: false }),
            done_tx,
        })
    }

    pub(crate) fn info(&self) -> ProcessInfo {
        self.inner.lock().info.clone()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    /// Move to a non-terminal state; ignored once terminal.
    pub(crate) fn set_state(&self, state: DriverState) {
        let mut inner = self.inner.lock();
        if inner.done {
            return;
        }
        inner.info.state = state;
    }

    pub(crate) fn set_pid(&self, pid: u32, started_at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.info.pid = pid;
        inner.info.started_at = Some(started_at);
    }

    /// Record the terminal outcome exactly once.
    pub(crate) fn record_exit(&self, code: i32, error: Option<String>, state: DriverState) {
        {
            let mut inner = self.inner.lock();
            if inner.done {
                return;
            }
            inner.done = true;
            inner.info.exit_code = Some(code);
            inner.info.state = state;
            if let Some(e) = error {
                inner.info.error = Some(e);
            }
        }
        let _ = self.done_tx.send(true);
    }

    /// Block until the terminal outcome is recorded.
    pub(crate) async fn wait_done(&self) -> i32 {
        let mut rx = self.done_tx.subscribe();
        // wait_for returns immediately when already done
        let _ = rx.wait_for(|done| *done).await;
        self.inner.lock().info.exit_code.unwrap_or(-1)
    }

    /// Bounded wait; false when the deadline passes first.
    pub(crate) async fn wait_done_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_done()).await.is_ok()
    }
}

/// Copy raw output chunks into a log ring until EOF.
pub(crate) async fn stream_into_ring(
    mut source: impl tokio::io::AsyncReadExt + Unpin,
    ring: Arc<crate::logring::LogRing>,
) {
    let mut buf = [0u8; 4096];
    loop {
        match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => ring.write(&buf[..n]),
        }
    }
}
