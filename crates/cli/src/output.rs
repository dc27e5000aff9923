// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering for service status output.

use warden_wire::ServiceStatus;

/// Render services as an aligned table.
pub fn render_services(services: &[ServiceStatus]) -> String {
    let headers = ["NAME", "TYPE", "STATE", "HEALTH", "PID", "PORT", "UPTIME", "RESTARTS"];
    let rows: Vec<Vec<String>> = services.iter().map(row).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    for (i, header) in headers.iter().enumerate() {
        out.push_str(&format!("{:<width$}  ", header, width = widths[i]));
    }
    out.push('\n');
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            out.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
        }
        out.push('\n');
    }
    out
}

fn row(s: &ServiceStatus) -> Vec<String> {
    vec![
        s.name.clone(),
        s.kind.clone(),
        s.state.clone(),
        s.health.clone().unwrap_or_else(|| "-".to_string()),
        s.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        s.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        s.uptime_secs.map(format_uptime).unwrap_or_else(|| "-".to_string()),
        s.restart_count.to_string(),
    ]
}

/// Compact uptime: "42s", "3m10s", "2h05m", "4d12h".
pub fn format_uptime(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d{:02}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Multi-line detail view for a single service.
pub fn render_service_detail(s: &ServiceStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("name:          {}\n", s.name));
    out.push_str(&format!("type:          {}\n", s.kind));
    out.push_str(&format!("state:         {}\n", s.state));
    if let Some(health) = &s.health {
        out.push_str(&format!("health:        {}\n", health));
    }
    if let Some(pid) = s.pid {
        out.push_str(&format!("pid:           {}\n", pid));
    }
    if let Some(port) = s.port {
        out.push_str(&format!("port:          {}\n", port));
    }
    if let Some(uptime) = s.uptime_secs {
        out.push_str(&format!("uptime:        {}\n", format_uptime(uptime)));
    }
    out.push_str(&format!("restarts:      {}\n", s.restart_count));
    if let Some(code) = s.last_exit_code {
        out.push_str(&format!("last exit:     {}\n", code));
    }
    if let Some(error) = &s.last_error {
        out.push_str(&format!("last error:    {}\n", error));
    }
    out
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
