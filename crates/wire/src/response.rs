// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::status::{ReloadSummary, ServiceStatus};

/// Response from the supervisor daemon to a control-plane client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Reply to Ping
    Pong,

    /// Reply to Hello
    Hello { version: String },

    /// All managed services
    Services { services: Vec<ServiceStatus> },

    /// One service's state record
    Service { service: ServiceStatus },

    /// Recent captured output, oldest first
    Logs { lines: Vec<String> },

    /// Reload outcome
    Reloaded { summary: ReloadSummary },

    /// Secret value
    Secret { value: String },

    /// Secret keys
    Secrets { keys: Vec<String> },

    /// Daemon is shutting down
    ShuttingDown,

    /// Operation failed
    Error { message: String },
}

impl Response {
    /// Shorthand for an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
