// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart policy and backoff arithmetic.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration;

/// Default delay between restarts when the spec leaves it unset.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// When to restart an exited service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    Never,
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Restart block of a service spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSpec {
    #[serde(default)]
    pub policy: RestartPolicy,
    /// 0 = unlimited
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default, with = "duration::opt")]
    pub delay: Option<Duration>,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default, with = "duration::opt")]
    pub max_delay: Option<Duration>,
}

impl RestartSpec {
    /// Whether the policy permits another attempt after `attempts` restarts.
    ///
    /// `exit_code` is the exit status of the incarnation that just ended;
    /// `on-failure` treats 0 as terminal success.
    pub fn should_restart(&self, exit_code: i32, attempts: u32) -> bool {
        match self.policy {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure if exit_code == 0 => false,
            RestartPolicy::OnFailure | RestartPolicy::Always => {
                self.max_attempts == 0 || attempts < self.max_attempts
            }
        }
    }
}

/// Delay before the next restart attempt.
///
/// Base is `restart.delay` (5s when unset or zero). Exponential backoff
/// doubles once per recorded attempt, capped at `max_delay` when set;
/// shift overflow clamps to a large finite delay.
pub fn restart_delay(spec: &RestartSpec, attempts: u32) -> Duration {
    let base = match spec.delay {
        Some(d) if !d.is_zero() => d,
        _ => DEFAULT_RESTART_DELAY,
    };

    let delay = match spec.backoff {
        Backoff::Fixed => base,
        Backoff::Exponential => {
            let shift = attempts.min(32);
            base.checked_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX))
                .unwrap_or(Duration::from_secs(u32::MAX as u64))
        }
    };

    match spec.max_delay {
        Some(max) if !max.is_zero() && delay > max => max,
        _ => delay,
    }
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
