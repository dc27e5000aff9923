// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: fixed paths under the state directory plus the
//! optional `config.yaml` overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env;
use crate::lifecycle::LifecycleError;

/// Default dynamic port allocation range.
const DEFAULT_PORT_RANGE: (u16, u16) = (20000, 20999);

/// Optional `config.yaml` in the state directory.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    /// Unix socket path override
    #[serde(default)]
    socket: Option<PathBuf>,
    /// TCP listen address for remote control (requires auth token)
    #[serde(default)]
    tcp_addr: Option<String>,
    /// Router output path; routing is disabled when unset
    #[serde(default)]
    router_path: Option<PathBuf>,
    /// Dynamic port range, inclusive
    #[serde(default)]
    port_min: Option<u16>,
    #[serde(default)]
    port_max: Option<u16>,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/warden)
    pub state_dir: PathBuf,
    /// Directory of service spec files
    pub services_dir: PathBuf,
    /// Path to Unix control socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to the adoption state file
    pub state_path: PathBuf,
    /// Path to the secret store file
    pub secrets_path: PathBuf,
    /// Router output path; routing disabled when None
    pub router_path: Option<PathBuf>,
    /// Optional TCP listen address
    pub tcp_addr: Option<String>,
    /// Bearer token required on TCP connections
    pub auth_token: Option<String>,
    /// Dynamic port allocation range, inclusive
    pub port_range: (u16, u16),
    /// Default per-service stop timeout
    pub stop_timeout: Duration,
    /// Drain window during blue/green deploys
    pub drain_timeout: Duration,
    /// Wait before redeploying adopted services
    pub adopt_redeploy_wait: Duration,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under the state directory; `config.yaml` there may
    /// override the socket, TCP address, router path, and port range.
    /// Environment variables win over the file.
    pub fn load() -> Result<Self, LifecycleError> {
        Self::load_from(env::state_dir()?)
    }

    /// Load configuration rooted at an explicit state directory.
    pub fn load_from(state_dir: PathBuf) -> Result<Self, LifecycleError> {
        let file = read_config_file(&state_dir.join("config.yaml"))?;

        let port_range = (
            file.port_min.unwrap_or(DEFAULT_PORT_RANGE.0),
            file.port_max.unwrap_or(DEFAULT_PORT_RANGE.1),
        );
        if port_range.0 == 0 || port_range.0 > port_range.1 {
            return Err(LifecycleError::Config(format!(
                "invalid port range {}-{}",
                port_range.0, port_range.1
            )));
        }

        Ok(Self {
            services_dir: state_dir.join("services"),
            socket_path: file
                .socket
                .unwrap_or_else(|| state_dir.join("control.sock")),
            lock_path: state_dir.join("wardend.pid"),
            log_path: state_dir.join("wardend.log"),
            state_path: state_dir.join("state.json"),
            secrets_path: state_dir.join("secrets.json"),
            router_path: file.router_path,
            tcp_addr: env::tcp_addr().or(file.tcp_addr),
            auth_token: env::auth_token(),
            port_range,
            stop_timeout: env::stop_timeout(),
            drain_timeout: env::drain_timeout(),
            adopt_redeploy_wait: env::adopt_redeploy_wait(),
            state_dir,
        })
    }
}

fn read_config_file(path: &std::path::Path) -> Result<ConfigFile, LifecycleError> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_yaml::from_str(&content)
            .map_err(|e| LifecycleError::Config(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(LifecycleError::Io(e)),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
