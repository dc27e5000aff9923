// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery adoption specs, including the PID-reuse guard.

use super::prelude::*;
use warden_daemon::driver::pidinfo;
use warden_daemon::service::ServicePhase;
use warden_daemon::state_file::{StateFile, StateRecord};

fn spawn_orphan() -> std::process::Child {
    std::process::Command::new("sleep")
        .arg("300")
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap()
}

fn write_record(h: &Harness, name: &str, pid: u32, command: &str, start_time: u64) {
    let state = StateFile::new(h.dir.path().join("state.json"));
    state
        .record(
            name,
            StateRecord {
                kind: "native".to_string(),
                pid,
                port: 0,
                started_at: unix_now(),
                command: command.to_string(),
                start_time,
            },
        )
        .unwrap();
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A recorded process that still matches its identity record is adopted
/// instead of restarted; a later redeploy replaces it with a fully
/// managed incarnation.
#[tokio::test]
async fn adoption_then_redeploy() {
    let h = Harness::new(28700, 28799);
    let mut orphan = spawn_orphan();
    let pid = orphan.id();
    let ident = pidinfo::process_ident(pid).unwrap();

    h.write_spec("keeper.yml", "name: keeper\ntype: native\ncommand: sleep 300\n");
    write_record(&h, "keeper", pid, "sleep 300", ident.start_time);

    let adopted = h.sup.start_all().await.unwrap();
    assert_eq!(adopted, vec!["keeper"]);

    let svc = h.sup.get("keeper").unwrap();
    assert!(wait_for(|| svc.state().phase == ServicePhase::Running, Duration::from_secs(2)).await);
    assert_eq!(svc.state().pid, pid, "adopted service must keep the recorded pid");
    // Adopted drivers cannot attach to stdio
    assert!(svc.log_lines(10).is_empty());

    // Reap concurrently: the orphan is this test's child, so the stop
    // poll would otherwise only see a zombie
    let reaper = std::thread::spawn(move || {
        orphan.wait().ok();
    });

    h.sup.redeploy_adopted().await;
    reaper.join().ok();

    let svc = h.sup.get("keeper").unwrap();
    assert!(
        wait_for(
            || {
                let s = svc.state();
                s.phase == ServicePhase::Running && s.pid > 0 && s.pid != pid
            },
            Duration::from_secs(5)
        )
        .await,
        "redeploy must replace the adopted process"
    );

    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// A record whose command does not match the live process is rejected
/// and the service starts fresh.
#[tokio::test]
async fn pid_reuse_guard_rejects_bogus_command() {
    let h = Harness::new(28800, 28899);
    let mut orphan = spawn_orphan();
    let pid = orphan.id();
    let ident = pidinfo::process_ident(pid).unwrap();

    h.write_spec("keeper.yml", "name: keeper\ntype: native\ncommand: sleep 300\n");
    // Bogus command: the guard must refuse to adopt
    write_record(&h, "keeper", pid, "postgres -D /data", ident.start_time);

    let adopted = h.sup.start_all().await.unwrap();
    assert!(adopted.is_empty());

    let svc = h.sup.get("keeper").unwrap();
    assert!(
        wait_for(
            || {
                let s = svc.state();
                s.phase == ServicePhase::Running && s.pid > 0 && s.pid != pid
            },
            Duration::from_secs(2)
        )
        .await,
        "rejected adoption must fall back to a fresh start"
    );

    // The impostor process was never touched
    assert!(pid_alive(pid));
    kill_pid(pid);
    orphan.wait().ok();
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// A record with a stale start time (the pid was reused) is rejected.
#[tokio::test]
async fn pid_reuse_guard_rejects_stale_start_time() {
    let h = Harness::new(28900, 28999);
    let mut orphan = spawn_orphan();
    let pid = orphan.id();
    let ident = pidinfo::process_ident(pid).unwrap();

    h.write_spec("keeper.yml", "name: keeper\ntype: native\ncommand: sleep 300\n");
    write_record(&h, "keeper", pid, "sleep 300", ident.start_time.wrapping_add(7));

    let adopted = h.sup.start_all().await.unwrap();
    assert!(adopted.is_empty());

    let svc = h.sup.get("keeper").unwrap();
    assert!(
        wait_for(|| svc.state().pid > 0 && svc.state().pid != pid, Duration::from_secs(2)).await
    );

    assert!(pid_alive(pid));
    kill_pid(pid);
    orphan.wait().ok();
    h.sup.stop_all(Duration::from_secs(2)).await;
}

/// A record pointing at a dead pid falls back to a fresh start.
#[tokio::test]
async fn dead_record_falls_back_to_fresh_start() {
    let h = Harness::new(29000, 29099);
    let mut gone = std::process::Command::new("true").spawn().unwrap();
    let pid = gone.id();
    gone.wait().unwrap();

    h.write_spec("keeper.yml", "name: keeper\ntype: native\ncommand: sleep 300\n");
    write_record(&h, "keeper", pid, "sleep 300", 12345);

    let adopted = h.sup.start_all().await.unwrap();
    assert!(adopted.is_empty());
    let svc = h.sup.get("keeper").unwrap();
    assert!(wait_for(|| svc.state().pid > 0, Duration::from_secs(2)).await);
    h.sup.stop_all(Duration::from_secs(2)).await;
}
