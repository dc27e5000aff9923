// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane client: one request/response exchange per connection.

use std::path::PathBuf;

use thiserror::Error;
use tokio::net::UnixStream;

use warden_daemon::env::ipc_timeout;
use warden_wire::{ProtocolError, Request, Response};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running at {0} (start it with `warden daemon run`)")]
    NotRunning(PathBuf),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send one request and wait for its response.
    pub async fn request(&self, request: &Request) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::NotRunning(self.socket_path.clone()))?;

        warden_wire::write_request(&mut stream, request, ipc_timeout()).await?;
        // Long-running operations (deploy drains, cascade stops) can
        // exceed the default IPC timeout several times over
        let response =
            warden_wire::read_response(&mut stream, ipc_timeout() * 24).await?;
        Ok(response)
    }
}
