// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process identity for the PID-reuse guard.
//!
//! Adoption compares the live process's executable short name and kernel
//! start time against the values recorded at spawn time. Start time
//! alone disambiguates PID reuse; the name check catches stale records.

/// Identity facts about a live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdent {
    /// Executable short name (kernel comm, truncated to 15 bytes on Linux)
    pub comm: String,
    /// Kernel start time (clock ticks since boot on Linux)
    pub start_time: u64,
}

/// Read the identity of a live process, or None when it does not exist.
#[cfg(target_os = "linux")]
pub fn process_ident(pid: u32) -> Option<ProcessIdent> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // Field 2 (comm) is parenthesised and may itself contain spaces or
    // parens, so split at the last ')'.
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let comm = stat.get(open + 1..close)?.to_string();
    let rest = stat.get(close + 2..)?;
    // starttime is field 22 of the stat line; `rest` begins at field 3
    let start_time = rest.split_whitespace().nth(19)?.parse().ok()?;
    Some(ProcessIdent { comm, start_time })
}

/// Fallback via `ps` for platforms without procfs. The start time is a
/// stable digest of the `lstart` string, which is second-granular and
/// constant for the lifetime of the process.
#[cfg(not(target_os = "linux"))]
pub fn process_ident(pid: u32) -> Option<ProcessIdent> {
    use sha2::{Digest, Sha256};

    let comm = ps_column(pid, "comm=")?;
    let comm = comm.rsplit('/').next().unwrap_or(&comm).to_string();
    let lstart = ps_column(pid, "lstart=")?;
    let digest = Sha256::digest(lstart.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Some(ProcessIdent { comm, start_time: u64::from_be_bytes(bytes) })
}

#[cfg(not(target_os = "linux"))]
fn ps_column(pid: u32, column: &str) -> Option<String> {
    let output = std::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", column])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Short name of a spec command line, comparable against a kernel comm.
///
/// Takes the basename of the first token and truncates it to the 15-byte
/// comm limit.
pub fn command_short_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or("");
    let base = first.rsplit('/').next().unwrap_or(first);
    base.chars().take(15).collect()
}

#[cfg(test)]
#[path = "pidinfo_tests.rs"]
mod tests;
