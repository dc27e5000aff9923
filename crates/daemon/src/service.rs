// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service supervision state machine.
//!
//! A managed service owns one driver per incarnation and exactly one
//! supervision task between `start` and the completion of `stop`. The
//! task walks Starting -> Running -> Evaluating -> Restarting and back,
//! applying the restart policy on every exit; all externally observable
//! methods only read snapshot fields under the service mutex.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::restart::restart_delay;
use warden_core::spec::{ServiceKind, ServiceSpec};

use crate::driver::container::ContainerSpec;
use crate::driver::{
    ContainerDriver, Driver, DriverError, NativeDriver, ProcessInfo, STOP_GRACE,
};
use crate::health::{HealthMonitor, HealthStatus, ProbeConfig};
use crate::secrets::SecretStore;

/// Fixed stop timeout when recycling an unhealthy service.
const UNHEALTHY_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Supervision state visible to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Stopped,
    Starting,
    Running,
    Evaluating,
    Restarting,
}

impl ServicePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServicePhase::Stopped => "stopped",
            ServicePhase::Starting => "starting",
            ServicePhase::Running => "running",
            ServicePhase::Evaluating => "evaluating",
            ServicePhase::Restarting => "restarting",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("external services have no process lifecycle")]
    External,

    #[error("service already running")]
    AlreadyRunning,
}

/// Snapshot of one service for status reporting.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub phase: ServicePhase,
    pub health: Option<HealthStatus>,
    pub pid: u32,
    pub port: u16,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
}

/// Callback invoked after each successful start, with the service name
/// and the fresh driver snapshot. The supervisor uses it to persist the
/// adoption record and regenerate the router.
pub type StartHook = Arc<dyn Fn(&str, &ProcessInfo) + Send + Sync>;

struct Inner {
    phase: ServicePhase,
    driver: Option<Arc<dyn Driver>>,
    /// Injected before `start` during crash recovery
    adopted: Option<Arc<dyn Driver>>,
    health: Option<HealthMonitor>,
    cancel: Option<CancellationToken>,
    done_rx: Option<watch::Receiver<bool>>,
    restarts: u32,
    /// Effective port (0 = none); static or allocated
    port: u16,
    last_exit_code: Option<i32>,
    last_error: Option<String>,
}

pub struct ManagedService {
    name: String,
    spec: ServiceSpec,
    spec_hash: String,
    secrets: Arc<dyn SecretStore>,
    on_start: Option<StartHook>,
    /// Supervisor lifecycle token; supervision tasks are children of it
    lifecycle: CancellationToken,
    inner: Arc<Mutex<Inner>>,
}

impl ManagedService {
    pub fn new(
        spec: ServiceSpec,
        secrets: Arc<dyn SecretStore>,
        on_start: Option<StartHook>,
        lifecycle: CancellationToken,
    ) -> Arc<Self> {
        let spec_hash = spec.hash();
        Arc::new(Self {
            name: spec.name.clone(),
            spec,
            spec_hash,
            secrets,
            on_start,
            lifecycle,
            inner: Arc::new(Mutex::new(Inner {
                phase: ServicePhase::Stopped,
                driver: None,
                adopted: None,
                health: None,
                cancel: None,
                done_rx: None,
                restarts: 0,
                port: 0,
                last_exit_code: None,
                last_error: None,
            })),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn spec_hash(&self) -> &str {
        &self.spec_hash
    }

    pub fn is_external(&self) -> bool {
        self.spec.is_external()
    }

    /// Effective port (0 when none).
    pub fn port(&self) -> u16 {
        self.inner.lock().port
    }

    pub fn set_port(&self, port: u16) {
        self.inner.lock().port = port;
    }

    pub fn restart_count(&self) -> u32 {
        self.inner.lock().restarts
    }

    /// Reset the restart budget (explicit operator restart).
    pub fn reset_restarts(&self) {
        self.inner.lock().restarts = 0;
    }

    /// Hand over a driver wrapping a pre-existing process; consumed by
    /// the next `start`.
    pub fn inject_adopted(&self, driver: Arc<dyn Driver>) {
        self.inner.lock().adopted = Some(driver);
    }

    pub fn health_status(&self) -> Option<HealthStatus> {
        self.inner.lock().health.as_ref().map(|h| h.status())
    }

    /// Begin supervision. Idempotent while a supervision task is live.
    ///
    /// External services install only the health monitor; everything
    /// else spawns the supervision task in `Starting`.
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        if self.is_external() {
            let mut inner = self.inner.lock();
            if inner.health.is_none() {
                if let Some(health) = &self.spec.health {
                    let cfg = ProbeConfig::from_spec(health, inner.port);
                    inner.health = Some(HealthMonitor::spawn(
                        self.name.clone(),
                        cfg,
                        Box::new(|| {}),
                    ));
                }
            }
            inner.phase = ServicePhase::Running;
            return Ok(());
        }

        let (cancel, done_tx) = {
            let mut inner = self.inner.lock();
            if inner.phase != ServicePhase::Stopped {
                return Ok(());
            }
            let cancel = self.lifecycle.child_token();
            let (done_tx, done_rx) = watch::channel(false);
            inner.cancel = Some(cancel.clone());
            inner.done_rx = Some(done_rx);
            inner.phase = ServicePhase::Starting;
            (cancel, done_tx)
        };

        let this = Arc::clone(self);
        tokio::spawn(this.run(RunStep::Starting, cancel, done_tx));
        Ok(())
    }

    /// Wrap an already-running driver and supervise it from `Running`,
    /// without a second start. Used by the deploy promotion step.
    pub async fn promote(self: &Arc<Self>, driver: Arc<dyn Driver>) -> Result<(), ServiceError> {
        if self.is_external() {
            return Err(ServiceError::External);
        }
        let (cancel, done_tx) = {
            let mut inner = self.inner.lock();
            if inner.phase != ServicePhase::Stopped {
                return Err(ServiceError::AlreadyRunning);
            }
            let cancel = self.lifecycle.child_token();
            let (done_tx, done_rx) = watch::channel(false);
            inner.driver = Some(driver);
            inner.cancel = Some(cancel.clone());
            inner.done_rx = Some(done_rx);
            inner.phase = ServicePhase::Running;
            (cancel, done_tx)
        };

        let this = Arc::clone(self);
        tokio::spawn(this.run(RunStep::Running, cancel, done_tx));
        Ok(())
    }

    /// Stop supervision and terminate the current driver. Idempotent;
    /// returns within `timeout` plus a small grace.
    pub async fn stop(&self, timeout: Duration) -> Result<(), ServiceError> {
        if self.is_external() {
            let mut inner = self.inner.lock();
            if let Some(health) = inner.health.take() {
                health.stop();
            }
            inner.phase = ServicePhase::Stopped;
            return Ok(());
        }

        let (cancel, driver, done_rx) = {
            let inner = self.inner.lock();
            (inner.cancel.clone(), inner.driver.clone(), inner.done_rx.clone())
        };

        self.stop_health();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(driver) = driver {
            driver.stop(timeout).await?;
        }
        if let Some(mut done_rx) = done_rx {
            let bounded = tokio::time::timeout(timeout + STOP_GRACE, done_rx.wait_for(|v| *v));
            if bounded.await.is_err() {
                warn!(service = %self.name, "supervision task did not finish within stop window");
            }
        }
        Ok(())
    }

    /// Cancel supervision and monitoring without terminating the
    /// process. Used only when handing a still-running process over to a
    /// new managed service during redeploy.
    pub async fn release(&self, timeout: Duration) {
        let (cancel, done_rx) = {
            let inner = self.inner.lock();
            (inner.cancel.clone(), inner.done_rx.clone())
        };
        self.stop_health();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(mut done_rx) = done_rx {
            let bounded = tokio::time::timeout(timeout + STOP_GRACE, done_rx.wait_for(|v| *v));
            if bounded.await.is_err() {
                warn!(service = %self.name, "supervision task did not finish within release window");
            }
        }
    }

    pub fn log_lines(&self, n: usize) -> Vec<String> {
        let driver = self.inner.lock().driver.clone();
        driver.map(|d| d.log_lines(n)).unwrap_or_default()
    }

    /// Point-in-time snapshot for status reporting.
    pub fn state(&self) -> ServiceState {
        let inner = self.inner.lock();
        let health = inner.health.as_ref().map(|h| h.status());

        if self.is_external() {
            // No process: reported state is the most recent health status
            return ServiceState {
                phase: inner.phase,
                health,
                pid: 0,
                port: inner.port,
                started_at: None,
                restart_count: 0,
                last_exit_code: None,
                last_error: None,
            };
        }

        let info = inner.driver.as_ref().map(|d| d.info());
        ServiceState {
            phase: inner.phase,
            health,
            pid: info.as_ref().map(|i| i.pid).unwrap_or(0),
            port: inner.port,
            started_at: info.as_ref().and_then(|i| i.started_at),
            restart_count: inner.restarts,
            last_exit_code: inner
                .last_exit_code
                .or(info.as_ref().and_then(|i| i.exit_code)),
            last_error: inner
                .last_error
                .clone()
                .or(info.and_then(|i| i.error)),
        }
    }

    /// Construct a driver for one incarnation of this spec.
    ///
    /// `port_override` substitutes the `PORT` environment variable (and
    /// the container port mapping) without touching the allocation; the
    /// deploy coordinator uses it for the parallel instance.
    pub(crate) fn build_driver(
        &self,
        port_override: Option<u16>,
    ) -> Result<Arc<dyn Driver>, ServiceError> {
        let port = port_override.unwrap_or_else(|| self.port());
        let env = self.build_env(port);

        match self.spec.kind {
            ServiceKind::Native => {
                let command = self.spec.command.clone().unwrap_or_default();
                Ok(Arc::new(NativeDriver::new(command, env)))
            }
            ServiceKind::Container => Ok(Arc::new(ContainerDriver::new(
                &self.name,
                ContainerSpec {
                    image: self.spec.image.clone().unwrap_or_default(),
                    cmd: self.spec.cmd.clone(),
                    network_mode: self.spec.network_mode.clone(),
                    volumes: self.spec.volumes.clone(),
                    env,
                    port,
                },
            ))),
            ServiceKind::External => Err(ServiceError::External),
        }
    }

    /// Spec env plus resolved secrets plus `PORT`. The process
    /// environment is inherited by native drivers at spawn time.
    fn build_env(&self, port: u16) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> =
            self.spec.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        for (var, key) in &self.spec.secrets {
            match self.secrets.get(key) {
                Some(value) => env.push((var.clone(), value)),
                // Per-key failure: the service still starts without it
                None => warn!(
                    service = %self.name,
                    var = %var,
                    key = %key,
                    "secret not found; starting without it"
                ),
            }
        }

        if port != 0 {
            env.push(("PORT".to_string(), port.to_string()));
        }
        env
    }

    fn set_phase(&self, phase: ServicePhase) {
        self.inner.lock().phase = phase;
    }

    /// Install the health monitor for the current incarnation, wiring
    /// its unhealthy transition into the supervision mailbox.
    fn install_health_with(&self, tx: mpsc::Sender<()>) {
        let Some(health) = &self.spec.health else {
            return;
        };
        let cfg = ProbeConfig::from_spec(health, self.port());
        let monitor = HealthMonitor::spawn(
            self.name.clone(),
            cfg,
            // Single-slot mailbox: extra signals while one is pending are
            // dropped, the intent is already expressed.
            Box::new(move || {
                let _ = tx.try_send(());
            }),
        );
        self.inner.lock().health = Some(monitor);
    }

    fn stop_health(&self) {
        if let Some(health) = self.inner.lock().health.take() {
            health.stop();
        }
    }

    async fn run(
        self: Arc<Self>,
        entry: RunStep,
        cancel: CancellationToken,
        done_tx: watch::Sender<bool>,
    ) {
        // Single-slot unhealthy mailbox for this supervision run
        let (unhealthy_tx, mut unhealthy_rx) = mpsc::channel::<()>(1);

        let mut step = entry;
        if matches!(step, RunStep::Running) {
            // Promotion path: supervise an already-running driver
            self.install_health_with(unhealthy_tx.clone());
        }

        loop {
            match step {
                RunStep::Starting => {
                    self.set_phase(ServicePhase::Starting);
                    let adopted = self.inner.lock().adopted.take();
                    let driver = match adopted {
                        Some(driver) => {
                            info!(service = %self.name, "adopting existing process");
                            driver
                        }
                        None => match self.build_driver(None) {
                            Ok(driver) => driver,
                            Err(_) => {
                                step = RunStep::Done;
                                continue;
                            }
                        },
                    };

                    match driver.start().await {
                        Ok(()) => {
                            self.inner.lock().driver = Some(Arc::clone(&driver));
                            // A stop that raced the launch must not leak
                            // the fresh process
                            if cancel.is_cancelled() {
                                let _ = driver.stop(UNHEALTHY_STOP_TIMEOUT).await;
                                step = RunStep::Done;
                                continue;
                            }
                            let info = driver.info();
                            info!(service = %self.name, pid = info.pid, "service started");
                            if let Some(hook) = &self.on_start {
                                hook(&self.name, &info);
                            }
                            self.install_health_with(unhealthy_tx.clone());
                            step = RunStep::Running;
                        }
                        Err(e) => {
                            warn!(service = %self.name, error = %e, "start failed");
                            {
                                let mut inner = self.inner.lock();
                                inner.last_error = Some(e.to_string());
                                inner.driver = Some(Arc::clone(&driver));
                            }
                            if cancel.is_cancelled() {
                                step = RunStep::Done;
                            } else {
                                // A failed launch counts against the
                                // restart budget like a crash would
                                step = RunStep::Evaluating(1);
                            }
                        }
                    }
                }

                RunStep::Running => {
                    self.set_phase(ServicePhase::Running);
                    let Some(driver) = self.inner.lock().driver.clone() else {
                        step = RunStep::Done;
                        continue;
                    };

                    tokio::select! {
                        code = driver.wait() => {
                            info!(service = %self.name, code, "process exited");
                            self.stop_health();
                            step = RunStep::Evaluating(code);
                        }
                        Some(()) = unhealthy_rx.recv() => {
                            warn!(service = %self.name, "unhealthy; stopping for restart");
                            self.stop_health();
                            let _ = driver.stop(UNHEALTHY_STOP_TIMEOUT).await;
                            let code = driver.wait().await;
                            step = RunStep::Evaluating(code);
                        }
                        _ = cancel.cancelled() => {
                            step = RunStep::Done;
                        }
                    }
                }

                RunStep::Evaluating(code) => {
                    self.set_phase(ServicePhase::Evaluating);
                    self.inner.lock().last_exit_code = Some(code);

                    if cancel.is_cancelled() {
                        step = RunStep::Done;
                        continue;
                    }
                    let attempts = self.inner.lock().restarts;
                    if self.spec.restart.should_restart(code, attempts) {
                        self.inner.lock().restarts = attempts + 1;
                        step = RunStep::Restarting(attempts);
                    } else {
                        debug!(service = %self.name, code, attempts, "not restarting");
                        step = RunStep::Done;
                    }
                }

                RunStep::Restarting(prior_attempts) => {
                    self.set_phase(ServicePhase::Restarting);
                    let delay = restart_delay(&self.spec.restart, prior_attempts);
                    debug!(service = %self.name, delay_ms = delay.as_millis() as u64, "restart scheduled");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => { step = RunStep::Starting; }
                        _ = cancel.cancelled() => { step = RunStep::Done; }
                    }
                }

                RunStep::Done => break,
            }
        }

        self.stop_health();
        {
            let mut inner = self.inner.lock();
            inner.phase = ServicePhase::Stopped;
            inner.cancel = None;
        }
        debug!(service = %self.name, "supervision task finished");
        let _ = done_tx.send(true);
    }
}

#[derive(Clone, Copy)]
enum RunStep {
    Starting,
    Running,
    Evaluating(i32),
    Restarting(u32),
    Done,
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
