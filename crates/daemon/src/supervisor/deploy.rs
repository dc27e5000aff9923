// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blue/green deploy coordinator.
//!
//! A routed service is replaced by starting a parallel instance on a
//! temporary port, validating its health, cutting the router over, and
//! only then tearing down the old instance. Failures before the cutover
//! leave the old instance and its routing untouched; failures after it
//! are not rolled back, the new instance is already serving.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::health::{self, ProbeConfig};
use crate::ports::compound_key;
use crate::service::ManagedService;

use super::{Supervisor, SupervisorError};

impl Supervisor {
    /// Replace the running instance of `name` behind the router.
    ///
    /// Services without a routing block fall back to a plain restart.
    /// `drain` overrides the configured drain window.
    pub async fn deploy(
        self: &Arc<Self>,
        name: &str,
        drain: Option<Duration>,
    ) -> Result<(), SupervisorError> {
        let old = self.get_known(name)?;
        if old.is_external() {
            return Err(SupervisorError::InvalidTarget(name.to_string()));
        }
        if !old.spec().has_routing() {
            info!(service = %name, "no routing block; deploy degrades to restart");
            return self.restart_service(name, self.config.stop_timeout).await;
        }

        // Concurrent-deploy guard: the temporary key exists for the whole
        // duration of a deploy.
        let deploy_key = compound_key(name, "deploy");
        if self.ports().port(&deploy_key) != 0 {
            return Err(SupervisorError::ConcurrentDeploy(name.to_string()));
        }
        let temp_port = self.ports().allocate_temporary(name, "deploy")?;
        info!(service = %name, port = temp_port, "starting parallel instance");

        // Parallel driver from the same spec, PORT overridden
        let driver = match old.build_driver(Some(temp_port)) {
            Ok(driver) => driver,
            Err(e) => {
                self.ports().release(&deploy_key);
                return Err(e.into());
            }
        };
        if let Err(e) = driver.start().await {
            self.ports().release(&deploy_key);
            return Err(SupervisorError::DriverStart {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }

        // Validate the candidate before sending traffic at it
        if let Some(health_spec) = &old.spec().health {
            let cfg = ProbeConfig::for_deploy(health_spec, temp_port);
            if !health::await_healthy(&cfg, self.lifecycle()).await {
                warn!(service = %name, "candidate failed health validation; rolling back");
                let _ = driver.stop(self.config.stop_timeout).await;
                self.ports().release(&deploy_key);
                return Err(SupervisorError::HealthTimeout(name.to_string()));
            }
        }

        // Cutover: all traffic to the new instance, then drain the old
        self.regenerate_router_with(Some((name, temp_port)));
        let drain = drain.unwrap_or(self.config.drain_timeout);
        info!(service = %name, drain_ms = drain.as_millis() as u64, "draining old instance");
        tokio::time::sleep(drain).await;

        // Tear down the old incarnation without letting it restart
        if let Err(e) = old.stop(self.config.stop_timeout).await {
            warn!(service = %name, error = %e, "old instance stop failed; proceeding");
        }

        // Promote: supervise the running driver directly, no second start
        let promoted = ManagedService::new(
            old.spec().clone(),
            Arc::clone(&self.secrets),
            Some(self.start_hook()),
            self.lifecycle().clone(),
        );
        promoted.set_port(temp_port);
        promoted.promote(Arc::clone(&driver)).await?;
        self.services.write().insert(name.to_string(), Arc::clone(&promoted));

        // Move the temporary allocation onto the primary key
        self.ports().release(name);
        if let Err(e) = self.ports().reassign(&deploy_key, name) {
            warn!(service = %name, error = %e, "port reassign failed");
        }

        self.persist_start(name, &driver.info());
        self.regenerate_router();
        info!(service = %name, port = temp_port, pid = driver.info().pid, "deploy complete");
        Ok(())
    }
}
