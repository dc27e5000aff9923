// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardend: the supervisor daemon binary.

use tracing::error;

use warden_daemon::{lifecycle, Config};

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wardend: {}", e);
            std::process::exit(1);
        }
    };

    let _guard = lifecycle::init_tracing(&config);

    if let Err(e) = lifecycle::run_daemon(config).await {
        error!(error = %e, "daemon failed");
        eprintln!("wardend: {}", e);
        std::process::exit(1);
    }
}
