// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blue/green deploy specs.

use super::prelude::*;
use warden_daemon::service::ServicePhase;
use warden_daemon::state_file::StateFile;

/// A routed service with a dynamic port is replaced without a second
/// start: new pid, new port in the router, new record in the state file.
#[tokio::test]
async fn blue_green_deploy_swaps_instance() {
    let h = Harness::new(29100, 29199);
    h.write_spec(
        "web.yml",
        concat!(
            "name: web\n",
            "type: native\n",
            "command: sleep 30\n",
            "network:\n  port: 0\n",
            "routing:\n  hostname: web.example.test\n",
            "health:\n  probe: exec\n  command: true\n  interval: 20ms\n  timeout: 500ms\n",
        ),
    );
    h.sup.start_all().await.unwrap();

    let old = h.sup.get("web").unwrap();
    assert!(wait_for(|| old.state().pid > 0, Duration::from_secs(2)).await);
    let pid_before = old.state().pid;
    let port_before = old.port();
    assert!(h.router_config().contains(&port_before.to_string()));

    h.sup.deploy("web", Some(Duration::from_secs(1))).await.unwrap();

    let new = h.sup.get("web").unwrap();
    let state = new.state();
    assert_eq!(state.phase, ServicePhase::Running);
    assert_ne!(state.pid, pid_before);

    let port_after = new.port();
    assert_ne!(port_after, port_before);

    // Router references the new port and no longer the old one
    let routes = h.router_config();
    assert!(routes.contains(&port_after.to_string()));
    assert!(!routes.contains(&port_before.to_string()));

    // State file records the new incarnation
    let record = StateFile::new(h.dir.path().join("state.json"))
        .load()
        .remove("web")
        .unwrap();
    assert_eq!(record.port, port_after);
    assert_eq!(record.pid, state.pid);

    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// The temporary allocation disappears once the deploy completes, so a
/// follow-up deploy is possible.
#[tokio::test]
async fn sequential_deploys_are_allowed() {
    let h = Harness::new(29200, 29299);
    h.write_spec(
        "web.yml",
        "name: web\ntype: native\ncommand: sleep 30\nnetwork:\n  port: 0\nrouting:\n  hostname: web.example.test\n",
    );
    h.sup.start_all().await.unwrap();
    let svc = h.sup.get("web").unwrap();
    assert!(wait_for(|| svc.state().pid > 0, Duration::from_secs(2)).await);

    h.sup.deploy("web", Some(Duration::from_millis(50))).await.unwrap();
    h.sup.deploy("web", Some(Duration::from_millis(50))).await.unwrap();

    let state = h.sup.get("web").unwrap().state();
    assert_eq!(state.phase, ServicePhase::Running);
    h.sup.stop_all(Duration::from_secs(2)).await;
}
