// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve state directory: WARDEN_STATE_DIR > XDG_STATE_HOME/warden > ~/.local/state/warden
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("warden"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/warden"))
}

/// Default IPC timeout
pub fn ipc_timeout() -> Duration {
    std::env::var("WARDEN_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// TCP listen address for remote control connections. When set, the daemon
/// listens here in addition to the Unix socket.
pub fn tcp_addr() -> Option<String> {
    std::env::var("WARDEN_TCP_ADDR").ok().filter(|s| !s.is_empty())
}

/// Auth token for TCP connections. Required when `WARDEN_TCP_ADDR` is set.
/// Validated in the Hello handshake for TCP connections.
pub fn auth_token() -> Option<String> {
    std::env::var("WARDEN_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Drain window before tearing down the old instance in a deploy
/// (default 5s, configurable via `WARDEN_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("WARDEN_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Wait before redeploying adopted services to restore log capture
/// (default 10s, configurable via `WARDEN_ADOPT_REDEPLOY_MS`).
pub fn adopt_redeploy_wait() -> Duration {
    std::env::var("WARDEN_ADOPT_REDEPLOY_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Default per-service stop timeout
pub fn stop_timeout() -> Duration {
    std::env::var("WARDEN_STOP_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}
