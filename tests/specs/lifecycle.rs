// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basic lifecycle specs: start, stop, restart policies, cascades.

use super::prelude::*;
use warden_daemon::service::ServicePhase;
use warden_daemon::supervisor::SupervisorError;

/// Load a trivial native spec, observe Running with a pid, stop it, and
/// observe Stopped.
#[tokio::test]
async fn basic_lifecycle() {
    let h = Harness::new(28100, 28199);
    h.write_spec(
        "echo.yml",
        "name: echo\ntype: native\ncommand: sleep 10\nrestart:\n  policy: never\n",
    );
    h.sup.start_all().await.unwrap();

    let svc = h.sup.get("echo").unwrap();
    assert!(
        wait_for(
            || {
                let s = svc.state();
                s.phase == ServicePhase::Running && s.pid > 0
            },
            Duration::from_secs(2)
        )
        .await,
        "expected Running with a positive pid within 2s"
    );

    h.sup.stop_service("echo", Duration::from_secs(5)).await.unwrap();
    assert_eq!(svc.state().phase, ServicePhase::Stopped);
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// A failing command under on-failure consumes its restart budget and
/// lands in a terminal state.
#[tokio::test]
async fn on_failure_restart_budget() {
    let h = Harness::new(28200, 28299);
    h.write_spec(
        "flaky.yml",
        "name: flaky\ntype: native\ncommand: false\nrestart:\n  policy: on-failure\n  max_attempts: 2\n  delay: 10ms\n",
    );
    h.sup.start_all().await.unwrap();

    let svc = h.sup.get("flaky").unwrap();
    assert!(
        wait_for(
            || svc.state().phase == ServicePhase::Stopped && svc.restart_count() >= 1,
            Duration::from_secs(2)
        )
        .await
    );
    let count = svc.restart_count();
    assert!((1..=2).contains(&count), "restart_count = {}", count);
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// A clean exit under on-failure never restarts.
#[tokio::test]
async fn clean_exit_does_not_restart() {
    let h = Harness::new(28300, 28399);
    h.write_spec(
        "oneshot.yml",
        "name: oneshot\ntype: native\ncommand: true\nrestart:\n  policy: on-failure\n  max_attempts: 3\n  delay: 10ms\n",
    );
    h.sup.start_all().await.unwrap();

    let svc = h.sup.get("oneshot").unwrap();
    assert!(
        wait_for(|| svc.state().phase == ServicePhase::Stopped, Duration::from_secs(2)).await
    );
    assert_eq!(svc.restart_count(), 0);
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// Stopping a required service takes down its transitive dependents
/// first.
#[tokio::test]
async fn cascade_stop() {
    let h = Harness::new(28400, 28499);
    h.write_spec("a.yml", "name: a\ntype: native\ncommand: sleep 30\n");
    h.write_spec(
        "b.yml",
        "name: b\ntype: native\ncommand: sleep 30\ndependencies:\n  after: [a]\n  requires: [a]\n",
    );
    h.write_spec(
        "c.yml",
        "name: c\ntype: native\ncommand: sleep 30\ndependencies:\n  after: [b]\n  requires: [b]\n",
    );
    h.sup.start_all().await.unwrap();

    for name in ["a", "b", "c"] {
        let svc = h.sup.get(name).unwrap();
        assert!(wait_for(|| svc.state().phase == ServicePhase::Running, Duration::from_secs(2)).await);
    }

    h.sup.stop_service("a", Duration::from_secs(2)).await.unwrap();
    for name in ["a", "b", "c"] {
        assert_eq!(h.sup.get(name).unwrap().state().phase, ServicePhase::Stopped);
    }
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// Reload restarts exactly the services whose content changed, under a
/// new pid.
#[tokio::test]
async fn reload_detects_change() {
    let h = Harness::new(28500, 28599);
    h.write_spec(
        "a.yml",
        "name: a\ntype: native\ncommand: sleep 30\nenv:\n  FOO: bar\n",
    );
    h.sup.start_all().await.unwrap();

    let svc = h.sup.get("a").unwrap();
    assert!(wait_for(|| svc.state().pid > 0, Duration::from_secs(2)).await);
    let pid_before = svc.state().pid;

    h.write_spec(
        "a.yml",
        "name: a\ntype: native\ncommand: sleep 30\nenv:\n  FOO: baz\n",
    );
    let result = h.sup.reload().await.unwrap();
    assert_eq!(result.restarted, vec!["a"]);

    let svc = h.sup.get("a").unwrap();
    assert!(
        wait_for(
            || {
                let s = svc.state();
                s.phase == ServicePhase::Running && s.pid > 0 && s.pid != pid_before
            },
            Duration::from_secs(2)
        )
        .await
    );
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// The control plane rejects lifecycle operations on externals while
/// still serving their state record.
#[tokio::test]
async fn control_plane_rejects_external() {
    let h = Harness::new(28600, 28699);
    h.write_spec(
        "gw.yml",
        "name: gw\ntype: external\nhealth:\n  probe: exec\n  command: true\n  interval: 30ms\n",
    );
    h.sup.start_all().await.unwrap();

    for result in [
        h.sup.start_service("gw").await,
        h.sup.stop_service("gw", Duration::from_secs(1)).await,
        h.sup.restart_service("gw", Duration::from_secs(1)).await,
        h.sup.deploy("gw", None).await,
    ] {
        assert!(matches!(result, Err(SupervisorError::InvalidTarget(_))));
    }

    let svc = h.sup.get("gw").unwrap();
    let state = svc.state();
    assert_eq!(state.phase, ServicePhase::Running);
    assert_eq!(state.pid, 0);
    h.sup.stop_all(Duration::from_secs(2)).await;
}
