// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-core: service specification model, validation, and ordering.
//!
//! Synchronous, runtime-free types shared by the daemon and the CLI:
//! the `ServiceSpec` data model with its content hash, the dependency
//! graph used for start/stop ordering and cascade stops, and restart
//! policy arithmetic.

pub mod duration;
pub mod graph;
pub mod restart;
pub mod spec;

pub use duration::{parse_duration, DurationError};
pub use graph::{DependencyGraph, GraphError};
pub use restart::{restart_delay, Backoff, RestartPolicy, RestartSpec};
pub use spec::{
    load_spec_dir, DependencySpec, HealthSpec, NetworkSpec, ProbeKind, RoutingSpec, ServiceKind,
    ServiceSpec, SpecError,
};
