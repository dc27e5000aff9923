// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the control-plane socket.
//!
//! Accepts connections on the Unix socket (trusted by file permission)
//! and optionally on TCP (bearer token required in the Hello handshake),
//! then forwards requests to the supervisor. Each connection is one
//! request/response exchange, handled on its own task.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use warden_wire::{ProtocolError, Request, Response, ServiceStatus};

use crate::env::{ipc_timeout, PROTOCOL_VERSION};
use crate::service::{ManagedService, ServicePhase};
use crate::supervisor::{Supervisor, SupervisorError};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub supervisor: Arc<Supervisor>,
    pub shutdown: Arc<Notify>,
    /// Set by a Shutdown request before the notify fires: true = orphan
    /// native children (managed shutdown), false = full teardown.
    pub shutdown_orphan: Mutex<bool>,
    /// Auth token TCP clients must present in the Hello handshake.
    pub auth_token: Option<String>,
}

/// Accept loop over the control-plane endpoints.
pub struct Listener {
    unix: UnixListener,
    tcp: Option<TcpListener>,
    ctx: Arc<ListenCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Source of a connection (for auth and error verbosity decisions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionSource {
    /// Local Unix socket: trusted, receives underlying error messages.
    Unix,
    /// Remote TCP: requires the token, receives generic errors.
    Tcp,
}

impl Listener {
    pub fn new(unix: UnixListener, tcp: Option<TcpListener>, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, tcp, ctx }
    }

    /// Accept until the process exits. The TCP endpoint participates in
    /// the race only when configured; otherwise that arm never fires.
    pub async fn run(self) {
        loop {
            tokio::select! {
                accepted = self.unix.accept() => match accepted {
                    Ok((stream, _)) => self.serve(stream, ConnectionSource::Unix),
                    Err(e) => error!("accept failed on unix socket: {}", e),
                },
                accepted = accept_tcp(self.tcp.as_ref()) => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "tcp connection");
                        self.serve(stream, ConnectionSource::Tcp);
                    }
                    Err(e) => error!("accept failed on tcp endpoint: {}", e),
                },
            }
        }
    }

    /// Run one request/response exchange on its own task.
    fn serve<S>(&self, stream: S, source: ConnectionSource)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            match handle_connection(stream, source, &ctx).await {
                Ok(()) => {}
                Err(ConnectionError::Protocol(ProtocolError::ConnectionClosed)) => {
                    debug!("client disconnected")
                }
                Err(ConnectionError::Protocol(ProtocolError::Timeout)) => {
                    warn!("connection timed out")
                }
                Err(e) => error!("connection failed: {}", e),
            }
        });
    }
}

/// Accept on the TCP endpoint when one is configured; never resolves
/// otherwise, leaving the Unix arm alone in the race.
async fn accept_tcp(tcp: Option<&TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match tcp {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Handle a single client connection: one request, one response. The
/// exchange is strictly sequential, so the stream is used whole rather
/// than split.
async fn handle_connection<S>(
    mut stream: S,
    source: ConnectionSource,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = warden_wire::read_request(&mut stream, ipc_timeout()).await?;

    // TCP connections must authenticate via Hello as the first request
    if source == ConnectionSource::Tcp {
        if let Some(rejection) = authenticate(&request, ctx) {
            let _ = warden_wire::write_response(&mut stream, &rejection, ipc_timeout()).await;
            return Ok(());
        }
    }

    if matches!(request, Request::ListServices | Request::GetService { .. }) {
        debug!(request = ?request, "received query");
    } else {
        info!(request = ?request, "received request");
    }

    let response = handle_request(request, ctx, source).await;
    debug!("sending response: {:?}", response);
    warden_wire::write_response(&mut stream, &response, ipc_timeout()).await?;
    Ok(())
}

/// Validate the opening request of a TCP connection. Returns the error
/// response to send when the handshake is rejected.
fn authenticate(request: &Request, ctx: &ListenCtx) -> Option<Response> {
    let Request::Hello { token, .. } = request else {
        return Some(Response::error("TCP connections must start with Hello"));
    };
    match &ctx.auth_token {
        Some(expected) if token.as_deref() != Some(expected.as_str()) => {
            Some(Response::error("unauthorized"))
        }
        // Token matches, or no token is configured on the daemon
        _ => None,
    }
}

/// Handle a single request and produce its response.
async fn handle_request(request: Request, ctx: &ListenCtx, source: ConnectionSource) -> Response {
    let sup = &ctx.supervisor;
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { .. } => Response::Hello { version: PROTOCOL_VERSION.to_string() },

        Request::ListServices => {
            let services = sup
                .service_names()
                .into_iter()
                .filter_map(|name| sup.get(&name).map(|svc| status_of(&name, &svc)))
                .collect();
            Response::Services { services }
        }

        Request::GetService { name } => match sup.get(&name) {
            Some(svc) => Response::Service { service: status_of(&name, &svc) },
            None => failure(&SupervisorError::NotFound(name), source),
        },

        Request::Start { name } => match sup.start_service(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => failure(&e, source),
        },

        Request::Stop { name, timeout_ms } => {
            let timeout = timeout_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or(sup.config().stop_timeout);
            match sup.stop_service(&name, timeout).await {
                Ok(()) => Response::Ok,
                Err(e) => failure(&e, source),
            }
        }

        Request::Restart { name } => {
            match sup.restart_service(&name, sup.config().stop_timeout).await {
                Ok(()) => Response::Ok,
                Err(e) => failure(&e, source),
            }
        }

        Request::Deploy { name, drain_ms } => {
            let drain = drain_ms.map(std::time::Duration::from_millis);
            match sup.deploy(&name, drain).await {
                Ok(()) => Response::Ok,
                Err(e) => failure(&e, source),
            }
        }

        Request::Logs { name, lines } => {
            let capped = lines.min(warden_wire::MAX_LOG_LINES);
            match sup.logs(&name, capped) {
                Ok(lines) => Response::Logs { lines },
                Err(e) => failure(&e, source),
            }
        }

        Request::Reload => match sup.reload().await {
            Ok(result) => Response::Reloaded {
                summary: warden_wire::ReloadSummary {
                    added: result.added,
                    removed: result.removed,
                    restarted: result.restarted,
                },
            },
            Err(e) => failure(&e, source),
        },

        Request::SecretSet { key, value } => match sup.secrets().set(&key, &value) {
            Ok(()) => Response::Ok,
            Err(e) => transient_failure(&e, source),
        },

        Request::SecretGet { key } => match sup.secrets().get(&key) {
            Some(value) => Response::Secret { value },
            None => match source {
                ConnectionSource::Unix => Response::error(format!("secret not found: {}", key)),
                ConnectionSource::Tcp => Response::error("operation failed"),
            },
        },

        Request::SecretList => Response::Secrets { keys: sup.secrets().list() },

        Request::SecretDelete { key } => match sup.secrets().delete(&key) {
            Ok(_) => Response::Ok,
            Err(e) => transient_failure(&e, source),
        },

        Request::Shutdown { orphan } => {
            *ctx.shutdown_orphan.lock() = orphan;
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

/// Unix-socket callers get the underlying message; network callers get a
/// generic one for the same condition.
fn failure(e: &SupervisorError, source: ConnectionSource) -> Response {
    warn!(error = %e, "request failed");
    match source {
        ConnectionSource::Unix => Response::error(e.to_string()),
        ConnectionSource::Tcp => Response::error("operation failed"),
    }
}

fn transient_failure(e: &std::io::Error, source: ConnectionSource) -> Response {
    warn!(error = %e, "request failed");
    match source {
        ConnectionSource::Unix => Response::error(e.to_string()),
        ConnectionSource::Tcp => Response::error("operation failed"),
    }
}

/// Map a managed service to its control-plane state record.
fn status_of(name: &str, svc: &Arc<ManagedService>) -> ServiceStatus {
    let state = svc.state();
    let uptime_secs = match (state.phase, state.started_at) {
        (ServicePhase::Running, Some(started)) => {
            u64::try_from((Utc::now() - started).num_seconds()).ok()
        }
        _ => None,
    };
    ServiceStatus {
        name: name.to_string(),
        kind: svc.spec().kind.as_str().to_string(),
        state: state.phase.as_str().to_string(),
        health: state.health.map(|h| h.as_str().to_string()),
        pid: (state.pid > 0).then_some(state.pid),
        port: (state.port > 0).then_some(state.port),
        uptime_secs,
        restart_count: state.restart_count,
        last_exit_code: state.last_exit_code,
        last_error: state.last_error,
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
