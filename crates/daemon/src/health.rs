// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health monitoring: periodic http/tcp/exec probes with threshold
//! semantics and a one-shot unhealthy notification per transition.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::spec::{HealthSpec, ProbeKind};

/// Observed health of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Resolved probe parameters for one service incarnation.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    /// URL path for http probes
    pub path: String,
    /// Target port for http/tcp probes
    pub port: u16,
    /// Shell command for exec probes
    pub command: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub grace_period: Option<Duration>,
    pub threshold: u32,
}

impl ProbeConfig {
    /// Resolve a spec health block against the service's effective port.
    pub fn from_spec(health: &HealthSpec, service_port: u16) -> Self {
        Self {
            kind: health.probe,
            path: health.path.clone().unwrap_or_else(|| "/".to_string()),
            port: health.port.unwrap_or(service_port),
            command: health.command.clone().unwrap_or_default(),
            interval: health.interval(),
            timeout: health.timeout(),
            grace_period: health.grace_period,
            threshold: health.threshold(),
        }
    }

    /// Variant for deploy validation loops: a tight default interval when
    /// the spec leaves it unset.
    pub fn for_deploy(health: &HealthSpec, service_port: u16) -> Self {
        let mut cfg = Self::from_spec(health, service_port);
        cfg.interval = health.interval.unwrap_or(Duration::from_millis(500));
        cfg
    }

    /// Probe attempts for bounded wait loops.
    pub fn max_attempts(&self) -> u32 {
        (self.threshold * 3).max(10)
    }
}

/// Periodic probe task for one service.
///
/// Starts `Unknown`; after the grace period runs one immediate probe,
/// then one every `interval`. Consecutive failures count toward the
/// threshold; the unhealthy callback fires exactly once per transition.
/// Any success resets both the counter and the status.
pub struct HealthMonitor {
    status: Arc<Mutex<HealthStatus>>,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn spawn(
        service: String,
        cfg: ProbeConfig,
        on_unhealthy: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        let status = Arc::new(Mutex::new(HealthStatus::Unknown));
        let cancel = CancellationToken::new();

        let task_status = Arc::clone(&status);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            run(service, cfg, task_status, task_cancel, on_unhealthy).await;
        });

        Self { status, cancel }
    }

    pub fn status(&self) -> HealthStatus {
        *self.status.lock()
    }

    /// Stop probing. Results observed after this are discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    service: String,
    cfg: ProbeConfig,
    status: Arc<Mutex<HealthStatus>>,
    cancel: CancellationToken,
    on_unhealthy: Box<dyn Fn() + Send + Sync>,
) {
    if let Some(grace) = cfg.grace_period {
        tokio::select! {
            _ = tokio::time::sleep(grace) => {}
            _ = cancel.cancelled() => return,
        }
    }

    let mut failures = 0u32;
    loop {
        let passed = single_check(&cfg).await;
        // A result that arrives after cancellation is stale: the driver
        // may already be stopped or replaced.
        if cancel.is_cancelled() {
            return;
        }

        if passed {
            failures = 0;
            *status.lock() = HealthStatus::Healthy;
        } else {
            failures = failures.saturating_add(1);
            debug!(service = %service, failures, threshold = cfg.threshold, "health probe failed");
            if failures == cfg.threshold {
                *status.lock() = HealthStatus::Unhealthy;
                warn!(service = %service, "service is unhealthy");
                on_unhealthy();
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(cfg.interval) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

/// One synchronous probe bounded by the configured timeout.
///
/// Used by the periodic monitor and by the deploy coordinator to
/// validate a candidate instance without installing monitoring.
pub async fn single_check(cfg: &ProbeConfig) -> bool {
    tokio::time::timeout(cfg.timeout, probe(cfg)).await.unwrap_or(false)
}

/// Bounded wait until a probe passes: `max(threshold*3, 10)` attempts at
/// the configured interval, after the optional grace period.
pub async fn await_healthy(cfg: &ProbeConfig, cancel: &CancellationToken) -> bool {
    if let Some(grace) = cfg.grace_period {
        tokio::select! {
            _ = tokio::time::sleep(grace) => {}
            _ = cancel.cancelled() => return false,
        }
    }
    for attempt in 0..cfg.max_attempts() {
        if attempt > 0 {
            tokio::select! {
                _ = tokio::time::sleep(cfg.interval) => {}
                _ = cancel.cancelled() => return false,
            }
        }
        if single_check(cfg).await {
            return true;
        }
    }
    false
}

async fn probe(cfg: &ProbeConfig) -> bool {
    match cfg.kind {
        ProbeKind::Tcp => TcpStream::connect(("127.0.0.1", cfg.port)).await.is_ok(),
        ProbeKind::Http => http_probe(cfg.port, &cfg.path).await,
        ProbeKind::Exec => exec_probe(&cfg.command).await,
    }
}

/// `GET http://127.0.0.1:<port><path>`; success is a 2xx status line.
async fn http_probe(port: u16, path: &str) -> bool {
    let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)).await else {
        return false;
    };
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    );
    if stream.write_all(request.as_bytes()).await.is_err() {
        return false;
    }

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    if reader.read_line(&mut status_line).await.is_err() {
        return false;
    }
    // "HTTP/1.1 200 OK"
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code))
}

/// Shell command exiting 0 within the timeout.
async fn exec_probe(command: &str) -> bool {
    if command.is_empty() {
        return false;
    }
    tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
