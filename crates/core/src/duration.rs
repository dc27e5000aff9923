// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration parsing for spec files.
//!
//! Specs write durations in compact form: a decimal count followed by
//! one of `ms`, `s`, `m`, `h`, `d`. A bare number means seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("malformed duration {0:?}")]
    Malformed(String),
}

/// Unit suffixes and their length in milliseconds, longest suffix first
/// so "ms" is tried before "m" and "s".
const UNITS: [(&str, u64); 5] = [
    ("ms", 1),
    ("s", 1_000),
    ("m", 60_000),
    ("h", 3_600_000),
    ("d", 86_400_000),
];

/// Parse a spec duration such as `"250ms"`, `"30s"`, `"5m"`, or `"40"`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(DurationError::Empty);
    }

    let (count_part, unit_millis) = UNITS
        .iter()
        .find_map(|(suffix, millis)| {
            text.strip_suffix(suffix).map(|rest| (rest.trim_end(), *millis))
        })
        // No recognized suffix: the whole thing is a count of seconds
        .unwrap_or((text, 1_000));

    if count_part.is_empty() || !count_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DurationError::Malformed(input.to_string()));
    }
    let count: u64 = count_part
        .parse()
        .map_err(|_| DurationError::Malformed(input.to_string()))?;

    count
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| DurationError::Malformed(input.to_string()))
}

/// Render a duration in the most compact spec form ("500ms", "30s", "5m").
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        return format!("{}ms", ms);
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 && secs > 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 && secs > 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Serde adapter for optional duration fields written as strings.
pub mod opt {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => ser.serialize_some(&format_duration(*d)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let s: Option<String> = Option::deserialize(de)?;
        match s {
            Some(s) => parse_duration(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
