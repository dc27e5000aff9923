// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container driver — manages one container via the local runtime CLI.
//!
//! The container is created with the runtime's restart policy disabled:
//! the supervisor owns restarts. Creation is idempotent (any container
//! with the same derived name is removed first). The runtime's log
//! stream is demultiplexed into the bounded ring.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    stream_into_ring, Driver, DriverError, DriverShared, DriverState, ProcessInfo, STOP_GRACE,
};
use crate::logring::LogRing;

/// Settings carried from the service spec into one container incarnation.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    pub network_mode: Option<String>,
    /// host path -> container path
    pub volumes: BTreeMap<String, String>,
    pub env: Vec<(String, String)>,
    /// Published port (0 = none)
    pub port: u16,
}

pub struct ContainerDriver {
    /// Derived container name, stable per service
    name: String,
    spec: ContainerSpec,
    ring: Arc<LogRing>,
    shared: Arc<DriverShared>,
    started: AtomicBool,
    /// Log-stream child, killed exactly once on exit
    log_child: Mutex<Option<tokio::process::Child>>,
}

impl ContainerDriver {
    pub fn new(service: &str, spec: ContainerSpec) -> Self {
        Self {
            name: format!("warden-{}", service),
            spec,
            ring: Arc::new(LogRing::default()),
            shared: DriverShared::new(),
            started: AtomicBool::new(false),
            log_child: Mutex::new(None),
        }
    }

    fn release_log_stream(&self) {
        if let Some(mut child) = self.log_child.lock().take() {
            let _ = child.start_kill();
        }
    }
}

#[async_trait]
impl Driver for ContainerDriver {
    async fn start(&self) -> Result<(), DriverError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Start("driver already used".to_string()));
        }
        self.shared.set_state(DriverState::Starting);

        // Idempotent create: remove any container left behind under the
        // same derived name.
        let _ = run_runtime(&["rm", "-f", &self.name]).await;

        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--restart".to_string(),
            "no".to_string(),
        ];
        if let Some(mode) = &self.spec.network_mode {
            args.push("--network".to_string());
            args.push(mode.clone());
        }
        for (host, container) in &self.spec.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host, container));
        }
        for (key, value) in &self.spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        if self.spec.port != 0 && self.spec.network_mode.as_deref() != Some("host") {
            args.push("-p".to_string());
            args.push(format!("127.0.0.1:{0}:{0}", self.spec.port));
        }
        args.push(self.spec.image.clone());
        args.extend(self.spec.cmd.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        if let Err(e) = run_runtime(&arg_refs).await {
            let msg = format!("container create failed: {}", e);
            self.shared.record_exit(-1, Some(msg.clone()), DriverState::Failed);
            return Err(DriverError::Start(msg));
        }

        // Best-effort PID for status output
        let pid = run_runtime(&["inspect", "-f", "{{.State.Pid}}", &self.name])
            .await
            .ok()
            .and_then(|out| out.trim().parse::<u32>().ok())
            .unwrap_or(0);
        self.shared.set_pid(pid, Utc::now());

        // Stream and demultiplex container logs into the ring
        let mut logs = tokio::process::Command::new(runtime_binary());
        logs.args(["logs", "-f", &self.name])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        match logs.spawn() {
            Ok(mut child) => {
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(stream_into_ring(stdout, Arc::clone(&self.ring)));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(stream_into_ring(stderr, Arc::clone(&self.ring)));
                }
                *self.log_child.lock() = Some(child);
            }
            Err(e) => warn!(container = %self.name, error = %e, "log streaming unavailable"),
        }

        self.shared.set_state(DriverState::Running);
        debug!(container = %self.name, pid, "container started");

        // Waiter: the runtime reports the exit code on natural exit
        let name = self.name.clone();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            match run_runtime(&["wait", &name]).await {
                Ok(out) => {
                    let code = out.trim().parse::<i32>().unwrap_or(-1);
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
            self.release_log_stream();
            return Ok(());
        }
        self.shared.set_state(DriverState::Stopping);

        let secs = timeout.as_secs().max(1).to_string();
        let graceful = tokio::time::timeout(
            timeout + STOP_GRACE,
            run_runtime(&["stop", "-t", &secs, &self.name]),
        )
        .await;

        match graceful {
            Ok(Ok(_)) => {}
            // Runtime error or escape past the deadline: force removal
            Ok(Err(e)) => {
                warn!(container = %self.name, error = %e, "graceful stop failed; forcing removal");
                let _ = run_runtime(&["rm", "-f", &self.name]).await;
            }
            Err(_) => {
                warn!(container = %self.name, "stop deadline exceeded; forcing removal");
                let _ = run_runtime(&["rm", "-f", &self.name]).await;
            }
        }

        if !self.shared.wait_done_timeout(STOP_GRACE).await {
            self.shared.record_exit(-1, Some("container unresponsive".to_string()), DriverState::Stopped);
        }
        self.release_log_stream();
        Ok(())
    }

    async fn wait(&self) -> i32 {
        let code = self.shared.wait_done().await;
        // Natural exit: release the log stream exactly once
        self.release_log_stream();
        code
    }

    fn log_lines(&self, n: usize) -> Vec<String> {
        self.ring.last(n)
    }

    fn info(&self) -> ProcessInfo {
        self.shared.info()
    }
}

fn runtime_binary() -> String {
    std::env::var("WARDEN_CONTAINER_RUNTIME").unwrap_or_else(|_| "docker".to_string())
}

/// Run one runtime CLI command, returning stdout on success.
async fn run_runtime(args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new(runtime_binary())
        .args(args)
        .output()
        .await
        .map_err(|e| format!("{} {}: {}", runtime_binary(), args.first().unwrap_or(&""), e))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

