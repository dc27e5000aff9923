// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec-directory reload reconciliation.
//!
//! A reload is all-or-nothing at the parse stage: any file that fails to
//! parse or validate rejects the whole reload and no graph change is
//! applied. Reconciliation then stops removed services, starts new
//! ones, and restarts those whose content hash changed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use warden_core::graph::DependencyGraph;
use warden_core::spec::{load_spec_dir, ServiceSpec};

use super::{Supervisor, SupervisorError};

/// Outcome of one reload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub restarted: Vec<String>,
}

impl Supervisor {
    /// Re-read the spec directory and reconcile the running set.
    pub async fn reload(self: &Arc<Self>) -> Result<ReloadResult, SupervisorError> {
        let specs = load_spec_dir(&self.config.services_dir)?;
        let graph = DependencyGraph::build(&specs);
        // Validate before applying: a cyclic graph rejects the reload
        let order = graph.start_order()?;
        *self.graph.write() = graph;

        let new_specs: HashMap<&str, &ServiceSpec> =
            specs.iter().map(|s| (s.name.as_str(), s)).collect();
        let current: Vec<String> = self.services.read().keys().cloned().collect();
        let mut result = ReloadResult::default();

        // Stop services whose names are gone, releasing their ports
        for name in &current {
            if new_specs.contains_key(name.as_str()) {
                continue;
            }
            info!(service = %name, "removed from specs; stopping");
            if let Some(svc) = self.get(name) {
                if let Err(e) = svc.stop(self.config.stop_timeout).await {
                    warn!(service = %name, error = %e, "stop of removed service failed");
                }
            }
            self.services.write().remove(name);
            self.ports().release(name);
            let _ = self.state_file().remove(name);
            result.removed.push(name.clone());
        }

        // New and changed services, walked in start order
        for name in &order {
            let Some(spec) = new_specs.get(name.as_str()).map(|s| (*s).clone()) else {
                continue;
            };
            match self.get(name) {
                None => {
                    info!(service = %name, "new service");
                    match self.create_service(spec, None) {
                        Ok(svc) => {
                            self.services.write().insert(name.clone(), Arc::clone(&svc));
                            if let Err(e) = svc.start().await {
                                warn!(service = %name, error = %e, "start failed");
                            }
                            result.added.push(name.clone());
                        }
                        Err(e) => warn!(service = %name, error = %e, "cannot create service"),
                    }
                }
                Some(existing) => {
                    if existing.spec_hash() == spec.hash() {
                        continue;
                    }
                    info!(service = %name, "spec changed; restarting");
                    if let Err(e) = existing.stop(self.config.stop_timeout).await {
                        warn!(service = %name, error = %e, "stop of changed service failed");
                    }
                    self.services.write().remove(name);
                    self.ports().release(name);
                    match self.create_service(spec, None) {
                        Ok(svc) => {
                            self.services.write().insert(name.clone(), Arc::clone(&svc));
                            if let Err(e) = svc.start().await {
                                warn!(service = %name, error = %e, "start failed");
                            }
                            result.restarted.push(name.clone());
                        }
                        Err(e) => warn!(service = %name, error = %e, "cannot recreate service"),
                    }
                }
            }
        }

        self.regenerate_router();
        info!(
            added = result.added.len(),
            removed = result.removed.len(),
            restarted = result.restarted.len(),
            "reload complete"
        );
        Ok(result)
    }
}
