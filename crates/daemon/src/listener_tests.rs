// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;

use warden_wire::{Request, Response};

use super::*;
use crate::secrets::MemorySecretStore;
use crate::supervisor::Supervisor;

fn test_supervisor(dir: &Path, port_min: u16, port_max: u16) -> Arc<Supervisor> {
    let config = crate::Config {
        state_dir: dir.to_path_buf(),
        services_dir: dir.join("services"),
        socket_path: dir.join("control.sock"),
        lock_path: dir.join("wardend.pid"),
        log_path: dir.join("wardend.log"),
        state_path: dir.join("state.json"),
        secrets_path: dir.join("secrets.json"),
        router_path: None,
        tcp_addr: None,
        auth_token: None,
        port_range: (port_min, port_max),
        stop_timeout: Duration::from_secs(2),
        drain_timeout: Duration::from_millis(100),
        adopt_redeploy_wait: Duration::from_secs(600),
    };
    Supervisor::new(config, Arc::new(MemorySecretStore::new()), None)
}

/// Bind a listener on a temp socket and return a connected client maker.
async fn start_listener(sup: Arc<Supervisor>, dir: &Path) -> std::path::PathBuf {
    let socket_path = dir.join("control.sock");
    let unix = UnixListener::bind(&socket_path).unwrap();
    let ctx = Arc::new(ListenCtx {
        supervisor: sup,
        shutdown: Arc::new(Notify::new()),
        shutdown_orphan: Mutex::new(false),
        auth_token: None,
    });
    tokio::spawn(Listener::new(unix, None, ctx).run());
    socket_path
}

async fn roundtrip(socket: &Path, request: &Request) -> Response {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    warden_wire::write_request(&mut stream, request, Duration::from_secs(2)).await.unwrap();
    warden_wire::read_response(&mut stream, Duration::from_secs(2)).await.unwrap()
}

#[tokio::test]
async fn ping_pong() {
    let dir = tempfile::tempdir().unwrap();
    let sup = test_supervisor(dir.path(), 27100, 27199);
    let socket = start_listener(sup, dir.path()).await;

    assert_eq!(roundtrip(&socket, &Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn hello_reports_version() {
    let dir = tempfile::tempdir().unwrap();
    let sup = test_supervisor(dir.path(), 27200, 27299);
    let socket = start_listener(sup, dir.path()).await;

    let response = roundtrip(
        &socket,
        &Request::Hello { version: "test".to_string(), token: None },
    )
    .await;
    match response {
        Response::Hello { version } => assert!(!version.is_empty()),
        other => panic!("expected Hello, got {:?}", other),
    }
}

#[tokio::test]
async fn get_unknown_service_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let sup = test_supervisor(dir.path(), 27300, 27399);
    let socket = start_listener(sup, dir.path()).await;

    let response = roundtrip(&socket, &Request::GetService { name: "ghost".to_string() }).await;
    match response {
        Response::Error { message } => assert!(message.contains("ghost")),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn list_and_get_running_service() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("services")).unwrap();
    std::fs::write(
        dir.path().join("services/echo.yml"),
        "name: echo\ntype: native\ncommand: sleep 30\n",
    )
    .unwrap();

    let sup = test_supervisor(dir.path(), 27400, 27499);
    sup.start_all().await.unwrap();
    let socket = start_listener(Arc::clone(&sup), dir.path()).await;

    // Give the supervision task a moment to reach Running
    tokio::time::sleep(Duration::from_millis(200)).await;

    match roundtrip(&socket, &Request::ListServices).await {
        Response::Services { services } => {
            assert_eq!(services.len(), 1);
            assert_eq!(services[0].name, "echo");
            assert_eq!(services[0].kind, "native");
            assert_eq!(services[0].state, "running");
            assert!(services[0].pid.is_some());
        }
        other => panic!("expected Services, got {:?}", other),
    }

    match roundtrip(&socket, &Request::GetService { name: "echo".to_string() }).await {
        Response::Service { service } => assert_eq!(service.name, "echo"),
        other => panic!("expected Service, got {:?}", other),
    }

    sup.stop_all(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn lifecycle_ops_on_external_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("services")).unwrap();
    std::fs::write(
        dir.path().join("services/gw.yml"),
        "name: gw\ntype: external\nhealth:\n  probe: exec\n  command: true\n  interval: 50ms\n",
    )
    .unwrap();

    let sup = test_supervisor(dir.path(), 27500, 27599);
    sup.start_all().await.unwrap();
    let socket = start_listener(Arc::clone(&sup), dir.path()).await;

    for request in [
        Request::Start { name: "gw".to_string() },
        Request::Stop { name: "gw".to_string(), timeout_ms: None },
        Request::Restart { name: "gw".to_string() },
        Request::Deploy { name: "gw".to_string(), drain_ms: None },
    ] {
        match roundtrip(&socket, &request).await {
            Response::Error { message } => {
                assert!(message.contains("external"), "unexpected message: {}", message)
            }
            other => panic!("expected Error for {:?}, got {:?}", request, other),
        }
    }

    // Reads still work
    match roundtrip(&socket, &Request::GetService { name: "gw".to_string() }).await {
        Response::Service { service } => {
            assert_eq!(service.kind, "external");
            assert!(service.pid.is_none());
        }
        other => panic!("expected Service, got {:?}", other),
    }

    sup.stop_all(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn secrets_roundtrip_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let sup = test_supervisor(dir.path(), 27600, 27699);
    let socket = start_listener(sup, dir.path()).await;

    let set = Request::SecretSet { key: "db/pass".to_string(), value: "v".to_string() };
    assert_eq!(roundtrip(&socket, &set).await, Response::Ok);

    match roundtrip(&socket, &Request::SecretGet { key: "db/pass".to_string() }).await {
        Response::Secret { value } => assert_eq!(value, "v"),
        other => panic!("expected Secret, got {:?}", other),
    }

    match roundtrip(&socket, &Request::SecretList).await {
        Response::Secrets { keys } => assert_eq!(keys, vec!["db/pass"]),
        other => panic!("expected Secrets, got {:?}", other),
    }

    assert_eq!(
        roundtrip(&socket, &Request::SecretDelete { key: "db/pass".to_string() }).await,
        Response::Ok
    );
}

#[tokio::test]
async fn logs_are_capped_and_returned() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("services")).unwrap();
    std::fs::write(
        dir.path().join("services/echo.yml"),
        "name: echo\ntype: native\ncommand: echo captured-line\nrestart:\n  policy: never\n",
    )
    .unwrap();

    let sup = test_supervisor(dir.path(), 27700, 27799);
    sup.start_all().await.unwrap();
    let socket = start_listener(Arc::clone(&sup), dir.path()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    match roundtrip(&socket, &Request::Logs { name: "echo".to_string(), lines: 50_000 }).await {
        Response::Logs { lines } => assert_eq!(lines, vec!["captured-line"]),
        other => panic!("expected Logs, got {:?}", other),
    }
}

#[tokio::test]
async fn shutdown_request_notifies_with_mode() {
    let dir = tempfile::tempdir().unwrap();
    let sup = test_supervisor(dir.path(), 27800, 27899);
    let socket_path = dir.path().join("control.sock");
    let unix = UnixListener::bind(&socket_path).unwrap();
    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        supervisor: sup,
        shutdown: Arc::clone(&shutdown),
        shutdown_orphan: Mutex::new(false),
        auth_token: None,
    });
    let ctx_probe = Arc::clone(&ctx);
    tokio::spawn(Listener::new(unix, None, ctx).run());

    let notified = shutdown.notified();
    let response = roundtrip(&socket_path, &Request::Shutdown { orphan: true }).await;
    assert_eq!(response, Response::ShuttingDown);
    tokio::time::timeout(Duration::from_secs(1), notified).await.unwrap();
    assert!(*ctx_probe.shutdown_orphan.lock());
}
