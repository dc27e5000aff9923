// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level supervisor: loads specs, orders startup and shutdown,
//! adopts surviving processes after a crash, reconciles spec changes,
//! and coordinates blue/green deploys.

pub mod deploy;
pub mod reload;
pub mod watcher;

pub use reload::ReloadResult;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::graph::{DependencyGraph, GraphError};
use warden_core::spec::{load_spec_dir, ServiceKind, ServiceSpec, SpecError};

use crate::config::Config;
use crate::driver::{pidinfo, AdoptedDriver, ProcessInfo};
use crate::health::HealthStatus;
use crate::ports::{PortAllocator, PortError};
use crate::router::{Route, Router};
use crate::secrets::SecretStore;
use crate::service::{ManagedService, ServiceError, StartHook};
use crate::state_file::{StateFile, StateRecord};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("service not found: {0}")]
    NotFound(String),

    #[error("operation not valid for external service: {0}")]
    InvalidTarget(String),

    #[error("deploy already in progress for {0}")]
    ConcurrentDeploy(String),

    #[error("driver start failed for {name}: {reason}")]
    DriverStart { name: String, reason: String },

    #[error("health check did not pass for {0}")]
    HealthTimeout(String),
}

pub struct Supervisor {
    config: Config,
    secrets: Arc<dyn SecretStore>,
    router: Option<Arc<dyn Router>>,
    ports: Arc<PortAllocator>,
    state_file: Arc<StateFile>,
    services: RwLock<HashMap<String, Arc<ManagedService>>>,
    graph: RwLock<DependencyGraph>,
    /// Root cancellation for every supervision task
    lifecycle: CancellationToken,
    /// Services adopted during recovery, awaiting redeploy
    adopted: Mutex<Vec<String>>,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl Supervisor {
    pub fn new(
        config: Config,
        secrets: Arc<dyn SecretStore>,
        router: Option<Arc<dyn Router>>,
    ) -> Arc<Self> {
        let ports = Arc::new(PortAllocator::new(config.port_range.0, config.port_range.1));
        let state_file = Arc::new(StateFile::new(config.state_path.clone()));
        Arc::new(Self {
            config,
            secrets,
            router,
            ports,
            state_file,
            services: RwLock::new(HashMap::new()),
            graph: RwLock::new(DependencyGraph::default()),
            lifecycle: CancellationToken::new(),
            adopted: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lifecycle(&self) -> &CancellationToken {
        &self.lifecycle
    }

    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Names adopted during the last startup.
    pub fn adopted_services(&self) -> Vec<String> {
        self.adopted.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ManagedService>> {
        self.services.read().get(name).cloned()
    }

    fn get_known(&self, name: &str) -> Result<Arc<ManagedService>, SupervisorError> {
        self.get(name).ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Load specs, start everything in dependency order, adopt surviving
    /// processes, then arm the redeploy timer and the spec watcher.
    ///
    /// Returns the names adopted during recovery.
    pub async fn start_all(self: &Arc<Self>) -> Result<Vec<String>, SupervisorError> {
        let specs = load_spec_dir(&self.config.services_dir)?;
        let graph = DependencyGraph::build(&specs);
        let order = graph.start_order()?;
        *self.graph.write() = graph;

        let records = self.state_file.load();
        let by_name: HashMap<&str, &ServiceSpec> =
            specs.iter().map(|s| (s.name.as_str(), s)).collect();
        let required: HashSet<&str> = specs
            .iter()
            .flat_map(|s| s.dependencies.requires.iter().map(String::as_str))
            .collect();

        for name in &order {
            let Some(spec) = by_name.get(name.as_str()).map(|s| (*s).clone()) else {
                continue;
            };

            // Crash recovery: a recorded native process that still exists
            // and matches its identity record gets adopted instead of
            // restarted.
            let adoption = if spec.kind == ServiceKind::Native {
                records.get(name).and_then(|rec| try_adopt(name, rec))
            } else {
                None
            };

            let reserved = adoption
                .as_ref()
                .and_then(|(_, port)| if *port > 0 { Some(*port) } else { None });
            let svc = match self.create_service(spec.clone(), reserved) {
                Ok(svc) => svc,
                Err(e) => {
                    warn!(service = %name, error = %e, "cannot create service; skipping");
                    continue;
                }
            };
            if let Some((driver, _)) = adoption {
                svc.inject_adopted(driver);
                self.adopted.lock().push(name.clone());
            }

            self.services.write().insert(name.clone(), Arc::clone(&svc));
            if let Err(e) = svc.start().await {
                warn!(service = %name, error = %e, "start failed");
                continue;
            }

            // Hard dependents block on this service's health before their
            // own start.
            if required.contains(name.as_str()) && spec.health.is_some() && !spec.is_external() {
                self.wait_until_healthy(&svc).await;
            }
        }

        self.regenerate_router();

        let adopted = self.adopted.lock().clone();
        if !adopted.is_empty() {
            info!(count = adopted.len(), "adopted services; redeploy scheduled");
            let this = Arc::clone(self);
            let wait = self.config.adopt_redeploy_wait;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => this.redeploy_adopted().await,
                    _ = this.lifecycle.cancelled() => {}
                }
            });
        }

        match watcher::spawn(Arc::clone(self)) {
            Ok(w) => *self.watcher.lock() = Some(w),
            Err(e) => warn!(error = %e, "spec watcher unavailable"),
        }

        Ok(adopted)
    }

    /// Poll the installed health monitor until `Healthy`, bounded by
    /// `max(threshold x 3, 10)` probes at the configured interval.
    async fn wait_until_healthy(&self, svc: &Arc<ManagedService>) {
        let Some(health) = svc.spec().health.clone() else {
            return;
        };
        if let Some(grace) = health.grace_period {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                _ = self.lifecycle.cancelled() => return,
            }
        }
        let attempts = (health.threshold() * 3).max(10);
        for _ in 0..attempts {
            if svc.health_status() == Some(HealthStatus::Healthy) {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(health.interval()) => {}
                _ = self.lifecycle.cancelled() => return,
            }
        }
        warn!(service = %svc.name(), "dependency did not become healthy within bounded wait");
    }

    /// Replace every adopted driver with a fully managed incarnation,
    /// restoring log capture. Routed services go through the blue/green
    /// path; the rest get a plain restart.
    pub async fn redeploy_adopted(self: &Arc<Self>) {
        let names = std::mem::take(&mut *self.adopted.lock());
        for name in names {
            info!(service = %name, "redeploying adopted service");
            let routed = self
                .get(&name)
                .map(|s| s.spec().has_routing())
                .unwrap_or(false);
            let result = if routed {
                self.deploy(&name, None).await
            } else {
                self.restart_service(&name, self.config.stop_timeout).await
            };
            if let Err(e) = result {
                warn!(service = %name, error = %e, "adopted redeploy failed");
            }
        }
    }

    /// Construct a managed service, resolving its port against the
    /// allocator (static specs bypass allocation).
    pub(crate) fn create_service(
        self: &Arc<Self>,
        spec: ServiceSpec,
        reserved_port: Option<u16>,
    ) -> Result<Arc<ManagedService>, SupervisorError> {
        let port = if let Some(port) = spec.static_port() {
            port
        } else if spec.wants_dynamic_port() {
            match reserved_port {
                Some(port) => {
                    self.ports.reserve(&spec.name, port)?;
                    port
                }
                None => self.ports.allocate(&spec.name)?,
            }
        } else {
            0
        };

        let svc = ManagedService::new(
            spec,
            Arc::clone(&self.secrets),
            Some(self.start_hook()),
            self.lifecycle.clone(),
        );
        svc.set_port(port);
        Ok(svc)
    }

    /// Narrow callback handed to every managed service: persist the
    /// adoption record and refresh the router after a successful start.
    pub(crate) fn start_hook(self: &Arc<Self>) -> StartHook {
        let weak = Arc::downgrade(self);
        Arc::new(move |name: &str, info: &ProcessInfo| {
            let Some(sup) = weak.upgrade() else {
                return;
            };
            sup.persist_start(name, info);
            sup.regenerate_router();
        })
    }

    pub(crate) fn persist_start(&self, name: &str, info: &ProcessInfo) {
        let Some(svc) = self.get(name) else {
            return;
        };
        let spec = svc.spec();
        let ident = pidinfo::process_ident(info.pid);
        let record = StateRecord {
            kind: spec.kind.as_str().to_string(),
            pid: info.pid,
            port: svc.port(),
            started_at: info
                .started_at
                .map(|t| t.timestamp())
                .unwrap_or_else(|| Utc::now().timestamp()),
            command: spec.command.clone().unwrap_or_default(),
            start_time: ident.map(|i| i.start_time).unwrap_or(0),
        };
        if let Err(e) = self.state_file.record(name, record) {
            warn!(service = %name, error = %e, "state file write failed");
        }
    }

    // --- per-service control -------------------------------------------------

    pub async fn start_service(&self, name: &str) -> Result<(), SupervisorError> {
        let svc = self.get_known(name)?;
        if svc.is_external() {
            return Err(SupervisorError::InvalidTarget(name.to_string()));
        }
        svc.start().await?;
        Ok(())
    }

    /// Stop a service, cascading to its transitive hard dependents first.
    pub async fn stop_service(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), SupervisorError> {
        let svc = self.get_known(name)?;
        if svc.is_external() {
            return Err(SupervisorError::InvalidTarget(name.to_string()));
        }

        let targets = self.graph.read().cascade_stop_targets(name);
        for target in &targets {
            if let Some(dependent) = self.get(target) {
                info!(service = %target, cause = %name, "cascade stop");
                if let Err(e) = dependent.stop(timeout).await {
                    warn!(service = %target, error = %e, "cascade stop failed");
                }
                let _ = self.state_file.remove(target);
            }
        }

        svc.stop(timeout).await?;
        let _ = self.state_file.remove(name);
        self.regenerate_router();
        Ok(())
    }

    /// Stop then start, with a fresh restart budget. Runs under the
    /// supervisor's lifecycle context, never a request-scoped one, so
    /// the new child outlives the control-plane call.
    pub async fn restart_service(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), SupervisorError> {
        let svc = self.get_known(name)?;
        if svc.is_external() {
            return Err(SupervisorError::InvalidTarget(name.to_string()));
        }
        svc.stop(timeout).await?;
        svc.reset_restarts();
        svc.start().await?;
        Ok(())
    }

    pub fn logs(&self, name: &str, lines: usize) -> Result<Vec<String>, SupervisorError> {
        Ok(self.get_known(name)?.log_lines(lines))
    }

    // --- shutdown ------------------------------------------------------------

    /// Managed shutdown: release native children (they stay running for
    /// adoption by the next supervisor), stop containers and monitors.
    pub async fn shutdown(&self) {
        info!("supervisor shutdown: orphaning native services");
        let services: Vec<Arc<ManagedService>> =
            self.services.read().values().cloned().collect();
        for svc in services {
            match svc.spec().kind {
                ServiceKind::Native => svc.release(self.config.stop_timeout).await,
                ServiceKind::Container | ServiceKind::External => {
                    if let Err(e) = svc.stop(self.config.stop_timeout).await {
                        warn!(service = %svc.name(), error = %e, "stop failed during shutdown");
                    }
                }
            }
        }
        self.lifecycle.cancel();
    }

    /// Full teardown in reverse dependency order; parallel fallback when
    /// the graph cannot produce an order. Clears the state file.
    pub async fn stop_all(&self, timeout: Duration) {
        info!("supervisor stop: full teardown");
        match self.graph.read().stop_order() {
            Ok(order) => {
                for name in order {
                    if let Some(svc) = self.get(&name) {
                        if let Err(e) = svc.stop(timeout).await {
                            warn!(service = %name, error = %e, "stop failed");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "no stop order; stopping in parallel");
                let mut set = tokio::task::JoinSet::new();
                for svc in self.services.read().values().cloned() {
                    set.spawn(async move {
                        let name = svc.name().to_string();
                        if let Err(e) = svc.stop(timeout).await {
                            warn!(service = %name, error = %e, "stop failed");
                        }
                    });
                }
                while set.join_next().await.is_some() {}
            }
        }
        if let Err(e) = self.state_file.clear() {
            warn!(error = %e, "state file clear failed");
        }
        self.lifecycle.cancel();
    }

    // --- router --------------------------------------------------------------

    /// Routes for every service carrying a routing block, sorted by name.
    fn routes_snapshot(&self, port_override: Option<(&str, u16)>) -> Vec<Route> {
        let services = self.services.read();
        let mut routes: Vec<Route> = services
            .iter()
            .filter_map(|(name, svc)| {
                let routing = svc.spec().routing.as_ref()?;
                let mut port = svc.port();
                if let Some((over_name, over_port)) = port_override {
                    if over_name == name {
                        port = over_port;
                    }
                }
                Some(Route {
                    name: name.clone(),
                    hostname: routing.hostname.clone(),
                    port,
                    tls: routing.tls,
                    tls_options: routing.tls_options.clone(),
                })
            })
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        routes
    }

    pub(crate) fn regenerate_router(&self) {
        self.regenerate_router_with(None);
    }

    /// Regenerate with one service's port overridden (deploy cutover).
    /// The snapshot is taken under the map lock; the router write runs
    /// outside it.
    pub(crate) fn regenerate_router_with(&self, port_override: Option<(&str, u16)>) {
        let Some(router) = &self.router else {
            return;
        };
        let routes = self.routes_snapshot(port_override);
        debug!(routes = routes.len(), "regenerating router config");
        if let Err(e) = router.generate(&routes) {
            warn!(error = %e, "router generation failed");
        }
    }

    pub(crate) fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub(crate) fn state_file(&self) -> &Arc<StateFile> {
        &self.state_file
    }
}

/// Attempt adoption for one recorded native service. Any failure is a
/// warning and the supervisor falls back to a fresh start.
fn try_adopt(
    name: &str,
    record: &StateRecord,
) -> Option<(Arc<dyn crate::driver::Driver>, u16)> {
    if record.kind != "native" || record.pid == 0 {
        return None;
    }
    let started_at = DateTime::<Utc>::from_timestamp(record.started_at, 0).unwrap_or_else(Utc::now);
    match AdoptedDriver::attach(record.pid, &record.command, record.start_time, started_at) {
        Ok(driver) => {
            info!(service = %name, pid = record.pid, "adopting recorded process");
            Some((Arc::new(driver) as Arc<dyn crate::driver::Driver>, record.port))
        }
        Err(e) => {
            warn!(service = %name, pid = record.pid, error = %e, "adoption rejected; starting fresh");
            None
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
