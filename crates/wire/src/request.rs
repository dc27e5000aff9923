// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Request from a control-plane client to the supervisor daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello {
        version: String,
        /// Auth token for TCP connections (ignored for Unix socket)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// List every managed service
    ListServices,

    /// Get a single service's state record
    GetService { name: String },

    /// Start a stopped service
    Start { name: String },

    /// Stop a service (cascades to hard dependents)
    Stop {
        name: String,
        /// Per-service stop timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Stop then start a service, resetting its restart counter
    Restart { name: String },

    /// Blue/green replace a routed service (plain restart otherwise)
    Deploy {
        name: String,
        /// Drain window override in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drain_ms: Option<u64>,
    },

    /// Fetch recent captured output lines
    Logs {
        name: String,
        /// Number of most recent lines to return (capped at 10 000)
        lines: usize,
    },

    /// Re-read the spec directory and reconcile
    Reload,

    /// Store a secret (front-end write path)
    SecretSet { key: String, value: String },

    /// Read a secret
    SecretGet { key: String },

    /// List secret keys
    SecretList,

    /// Delete a secret
    SecretDelete { key: String },

    /// Request daemon shutdown
    Shutdown {
        /// Leave native children running (containers are still stopped)
        #[serde(default)]
        orphan: bool,
    },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
