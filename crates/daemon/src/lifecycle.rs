// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: lock acquisition, socket binding, signal dispatch,
//! and teardown of the on-disk control-plane artifacts.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::Config;
use crate::listener::{ListenCtx, Listener};
use crate::router::{FileRouter, Router};
use crate::secrets::FileSecretStore;
use crate::supervisor::{Supervisor, SupervisorError};

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("startup failed: {0}")]
    Startup(#[from] SupervisorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialize tracing with a file appender and a stderr layer.
///
/// The returned guard must be held for the life of the process; dropping
/// it stops the background log writer.
pub fn init_tracing(config: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let file = tracing_appender::rolling::never(
        config.log_path.parent().unwrap_or(&config.state_dir),
        config
            .log_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wardend.log".to_string()),
    );
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    guard
}

/// Run the daemon until a shutdown signal arrives.
///
/// SIGTERM (managed shutdown) orphans native children for adoption by
/// the next incarnation; SIGINT and a non-orphan control-plane Shutdown
/// perform the full teardown.
pub async fn run_daemon(config: Config) -> Result<(), LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.services_dir)?;

    // Exclusive PID-file lock: one daemon per state directory.
    // Held for the whole run; released when `lock_file` drops on return.
    let mut lock_file = File::create(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // Remove a stale socket from an unclean exit, then bind 0600
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let unix = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;
    set_private(&config.socket_path)?;

    let tcp = match &config.tcp_addr {
        Some(addr) => Some(
            TcpListener::bind(addr)
                .await
                .map_err(|e| LifecycleError::BindFailed(PathBuf::from(addr), e))?,
        ),
        None => None,
    };

    let secrets = Arc::new(FileSecretStore::new(config.secrets_path.clone()));
    let router = config
        .router_path
        .clone()
        .map(|path| Arc::new(FileRouter::new(path)) as Arc<dyn Router>);

    let supervisor = Supervisor::new(config.clone(), secrets, router);
    let adopted = supervisor.start_all().await?;
    if !adopted.is_empty() {
        info!(services = ?adopted, "adopted from previous incarnation");
    }

    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        supervisor: Arc::clone(&supervisor),
        shutdown: Arc::clone(&shutdown),
        shutdown_orphan: Mutex::new(false),
        auth_token: config.auth_token.clone(),
    });
    let listener = Listener::new(unix, tcp, Arc::clone(&ctx));
    tokio::spawn(listener.run());
    info!(socket = %config.socket_path.display(), "daemon ready");

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM: managed shutdown, orphaning native services");
            supervisor.shutdown().await;
        }
        _ = sigint.recv() => {
            info!("SIGINT: full teardown");
            supervisor.stop_all(config.stop_timeout).await;
        }
        _ = shutdown.notified() => {
            let orphan = *ctx.shutdown_orphan.lock();
            if orphan {
                info!("shutdown requested (orphan)");
                supervisor.shutdown().await;
            } else {
                info!("shutdown requested (full stop)");
                supervisor.stop_all(config.stop_timeout).await;
            }
        }
    }

    for path in [&config.socket_path, &config.lock_path] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "cleanup failed");
            }
        }
    }
    info!("daemon exit");
    Ok(())
}

#[cfg(unix)]
fn set_private(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_private(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
