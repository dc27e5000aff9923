// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_without_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(dir.path().to_path_buf()).unwrap();

    assert_eq!(config.services_dir, dir.path().join("services"));
    assert_eq!(config.socket_path, dir.path().join("control.sock"));
    assert_eq!(config.state_path, dir.path().join("state.json"));
    assert!(config.router_path.is_none());
    assert_eq!(config.port_range, (20000, 20999));
}

#[test]
fn config_file_overrides_paths_and_range() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "socket: /tmp/custom.sock\nrouter_path: /tmp/routes.json\nport_min: 31000\nport_max: 31099\n",
    )
    .unwrap();

    let config = Config::load_from(dir.path().to_path_buf()).unwrap();
    assert_eq!(config.socket_path, std::path::PathBuf::from("/tmp/custom.sock"));
    assert_eq!(
        config.router_path,
        Some(std::path::PathBuf::from("/tmp/routes.json"))
    );
    assert_eq!(config.port_range, (31000, 31099));
}

#[test]
fn invalid_port_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yaml"), "port_min: 9000\nport_max: 8000\n").unwrap();
    assert!(Config::load_from(dir.path().to_path_buf()).is_err());
}

#[test]
fn malformed_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yaml"), "socket: [oops\n").unwrap();
    assert!(Config::load_from(dir.path().to_path_buf()).is_err());
}
