// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service specification: the declarative description of one service.
//!
//! Specs are written as one YAML document per file in the `services/`
//! directory. The validator here is the only gate: everything downstream
//! (supervisor, drivers, deploy) assumes a validated spec.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::duration;
use crate::restart::RestartSpec;

/// Errors from loading or validating service specs.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("service {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("duplicate service name: {0}")]
    Duplicate(String),
}

/// How a service is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Child process spawned directly by the supervisor
    Native,
    /// Managed container via the local container runtime
    Container,
    /// Process not owned by the supervisor; health-monitored only
    External,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Native => "native",
            ServiceKind::Container => "container",
            ServiceKind::External => "external",
        }
    }
}

/// Network block: a static port, or 0 to allocate dynamically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub port: Option<u16>,
}

/// Routing block for services fronted by the external HTTP router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSpec {
    pub hostname: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub tls_options: Option<String>,
}

/// Health probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Tcp,
    Exec,
}

/// Health block: periodic probe parameters and threshold semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSpec {
    pub probe: ProbeKind,
    /// URL path for http probes
    #[serde(default)]
    pub path: Option<String>,
    /// Probe port override; falls back to the service port
    #[serde(default)]
    pub port: Option<u16>,
    /// Shell command for exec probes
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default, with = "duration::opt")]
    pub interval: Option<Duration>,
    #[serde(default, with = "duration::opt")]
    pub timeout: Option<Duration>,
    #[serde(default, with = "duration::opt")]
    pub grace_period: Option<Duration>,
    #[serde(default)]
    pub unhealthy_threshold: u32,
}

impl HealthSpec {
    /// Probe interval, defaulting to 10s.
    pub fn interval(&self) -> Duration {
        self.interval.unwrap_or(Duration::from_secs(10))
    }

    /// Per-probe timeout, defaulting to 5s.
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(Duration::from_secs(5))
    }

    /// Consecutive failures before the unhealthy transition (default 3).
    pub fn threshold(&self) -> u32 {
        if self.unhealthy_threshold == 0 {
            3
        } else {
            self.unhealthy_threshold
        }
    }
}

/// Dependency block. `requires` is the hard subset of `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// The declarative description of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,

    /// Command line for native services, tokenised by whitespace
    #[serde(default)]
    pub command: Option<String>,

    /// Image reference for container services
    #[serde(default)]
    pub image: Option<String>,
    /// Command override inside the container
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub network_mode: Option<String>,
    /// host path -> container path
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// env var -> secret store key, resolved at start time
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    #[serde(default)]
    pub network: Option<NetworkSpec>,
    #[serde(default)]
    pub routing: Option<RoutingSpec>,
    #[serde(default)]
    pub health: Option<HealthSpec>,
    #[serde(default)]
    pub restart: RestartSpec,
    #[serde(default)]
    pub dependencies: DependencySpec,
}

impl ServiceSpec {
    /// Parse a single YAML document and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, SpecError> {
        let spec: ServiceSpec = serde_yaml::from_str(content).map_err(|source| {
            SpecError::Parse { path: "<inline>".to_string(), source }
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Static port from the network block, if one is configured (0 excluded).
    pub fn static_port(&self) -> Option<u16> {
        match self.network.as_ref().and_then(|n| n.port) {
            Some(0) | None => None,
            Some(p) => Some(p),
        }
    }

    /// True when the network block requests dynamic allocation (`port: 0`).
    pub fn wants_dynamic_port(&self) -> bool {
        matches!(self.network.as_ref().and_then(|n| n.port), Some(0))
    }

    pub fn is_external(&self) -> bool {
        self.kind == ServiceKind::External
    }

    pub fn has_routing(&self) -> bool {
        self.routing.is_some()
    }

    /// Stable content hash over the canonical JSON serialization.
    ///
    /// Map fields are BTreeMaps, so serialization order is deterministic
    /// and the hash changes exactly when a supervised field changes.
    pub fn hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Validate the spec. The supervisor assumes validated input.
    pub fn validate(&self) -> Result<(), SpecError> {
        let invalid = |reason: String| SpecError::Invalid { name: self.name.clone(), reason };

        if self.name.is_empty() {
            return Err(SpecError::Invalid {
                name: "<unnamed>".to_string(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(invalid("name must be filesystem-safe ([a-zA-Z0-9._-])".to_string()));
        }

        match self.kind {
            ServiceKind::Native => {
                if self.command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(invalid("native service requires a command".to_string()));
                }
            }
            ServiceKind::Container => {
                if self.image.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(invalid("container service requires an image".to_string()));
                }
            }
            ServiceKind::External => {}
        }

        if let Some(health) = &self.health {
            match health.probe {
                ProbeKind::Http => {
                    if health.path.as_deref().unwrap_or("").is_empty() {
                        return Err(invalid("http probe requires a path".to_string()));
                    }
                }
                ProbeKind::Exec => {
                    if health.command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                        return Err(invalid("exec probe requires a command".to_string()));
                    }
                }
                ProbeKind::Tcp => {}
            }
            if health.interval().is_zero() {
                return Err(invalid("health interval must be positive".to_string()));
            }
            if health.timeout().is_zero() {
                return Err(invalid("health timeout must be positive".to_string()));
            }
            // http/tcp probes need some port: explicit, static, or dynamic
            if matches!(health.probe, ProbeKind::Http | ProbeKind::Tcp)
                && health.port.is_none()
                && self.network.as_ref().and_then(|n| n.port).is_none()
            {
                return Err(invalid(format!(
                    "{:?} probe requires a port (health.port or network.port)",
                    health.probe
                )));
            }
        }

        for req in &self.dependencies.requires {
            if !self.dependencies.after.contains(req) {
                return Err(invalid(format!(
                    "requires entry {:?} must also appear in after",
                    req
                )));
            }
        }

        Ok(())
    }
}

/// Load every `*.yml` / `*.yaml` spec in a directory.
///
/// Any file that fails to read, parse, or validate aborts the whole load;
/// there is no partial apply. Results are ordered by file name so repeated
/// loads are deterministic.
pub fn load_spec_dir(dir: &Path) -> Result<Vec<ServiceSpec>, SpecError> {
    let mut paths: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
            })
            .collect(),
        // A missing spec directory is an empty service set, not an error
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SpecError::Read { path: dir.display().to_string(), source: e });
        }
    };
    paths.sort();

    let mut specs = Vec::with_capacity(paths.len());
    let mut seen = std::collections::HashSet::new();
    for path in paths {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(&path)
            .map_err(|source| SpecError::Read { path: display.clone(), source })?;
        let spec: ServiceSpec = serde_yaml::from_str(&content)
            .map_err(|source| SpecError::Parse { path: display, source })?;
        spec.validate()?;
        if !seen.insert(spec.name.clone()) {
            return Err(SpecError::Duplicate(spec.name));
        }
        specs.push(spec);
    }
    Ok(specs)
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
