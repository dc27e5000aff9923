// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router interface: the external reverse proxy's view of the world.
//!
//! The supervisor hands the router a full route snapshot after every
//! topology change. The file format is opaque to the supervision core;
//! failures are logged by the caller and never fatal.

use std::path::PathBuf;

use serde::Serialize;

/// One routed service as the reverse proxy should see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_options: Option<String>,
}

/// Consumer of route snapshots.
pub trait Router: Send + Sync {
    /// Idempotent write of the full route set to the configured output.
    fn generate(&self, routes: &[Route]) -> std::io::Result<()>;
}

/// File-backed router config generator.
///
/// Renders a deterministic JSON document (routes sorted by name) so
/// repeated generation with the same topology produces identical bytes.
pub struct FileRouter {
    path: PathBuf,
}

impl FileRouter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Router for FileRouter {
    fn generate(&self, routes: &[Route]) -> std::io::Result<()> {
        let mut sorted: Vec<&Route> = routes.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let content = serde_json::to_string_pretty(&serde_json::json!({ "routes": sorted }))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
