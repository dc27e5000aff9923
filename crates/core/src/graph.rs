// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency graph over `after`/`requires` edges.
//!
//! Built once per load from the validated spec set. `after` is pure
//! ordering; `requires` is the hard subset that participates in cascade
//! stops. Edge targets that are not in the spec set are skipped: they may
//! resolve in a later reload.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::spec::ServiceSpec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle detected at service {0}")]
    Cycle(String),
}

/// The DAG formed by `after`/`requires` edges of a spec set.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Node names in spec-load order
    nodes: Vec<String>,
    /// name -> services it must start after (known targets only)
    after: HashMap<String, Vec<String>>,
    /// name -> services it hard-requires (subset of after)
    requires: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn build(specs: &[ServiceSpec]) -> Self {
        let known: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();

        let mut nodes = Vec::with_capacity(specs.len());
        let mut after = HashMap::new();
        let mut requires = HashMap::new();
        for spec in specs {
            nodes.push(spec.name.clone());
            let keep = |edges: &[String]| {
                edges
                    .iter()
                    .filter(|t| known.contains(t.as_str()))
                    .cloned()
                    .collect::<Vec<_>>()
            };
            after.insert(spec.name.clone(), keep(&spec.dependencies.after));
            requires.insert(spec.name.clone(), keep(&spec.dependencies.requires));
        }
        Self { nodes, after, requires }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.after.contains_key(name)
    }

    /// Services that `name` hard-requires.
    pub fn requires_of(&self, name: &str) -> &[String] {
        self.requires.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first topological start order: dependencies before dependents.
    ///
    /// Fails on the first node found inside the visitation stack.
    pub fn start_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut done: HashSet<&str> = HashSet::new();
        let mut in_stack: HashSet<&str> = HashSet::new();

        for node in &self.nodes {
            self.visit(node, &mut done, &mut in_stack, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        done: &mut HashSet<&'a str>,
        in_stack: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if done.contains(node) {
            return Ok(());
        }
        if !in_stack.insert(node) {
            return Err(GraphError::Cycle(node.to_string()));
        }
        if let Some(deps) = self.after.get(node) {
            for dep in deps {
                self.visit(dep, done, in_stack, order)?;
            }
        }
        in_stack.remove(node);
        done.insert(node);
        order.push(node.to_string());
        Ok(())
    }

    /// Reverse of the start order: dependents stop before their dependencies.
    pub fn stop_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = self.start_order()?;
        order.reverse();
        Ok(order)
    }

    /// Transitive `requires`-dependents of `name`, in first-discovery order.
    ///
    /// These are the services that must be stopped before `name` can go
    /// down. `name` itself is not included.
    pub fn cascade_stop_targets(&self, name: &str) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(name);

        // Breadth-first over reverse `requires` edges
        let mut frontier: VecDeque<String> = VecDeque::from([name.to_string()]);
        while let Some(current) = frontier.pop_front() {
            for node in &self.nodes {
                if seen.contains(node.as_str()) {
                    continue;
                }
                let reqs = self.requires.get(node).map(Vec::as_slice).unwrap_or(&[]);
                if reqs.iter().any(|r| r == &current) {
                    seen.insert(node);
                    targets.push(node.clone());
                    frontier.push_back(node.clone());
                }
            }
        }
        targets
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
