// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for supervisor specs.

pub use std::sync::Arc;
pub use std::time::Duration;

use warden_daemon::router::FileRouter;
use warden_daemon::secrets::FileSecretStore;
pub use warden_daemon::supervisor::Supervisor;
pub use warden_daemon::Config;

/// A supervisor rooted in a throwaway state directory.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub sup: Arc<Supervisor>,
}

impl Harness {
    /// Each spec gets its own port range so parallel tests never collide.
    pub fn new(port_min: u16, port_max: u16) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            state_dir: dir.path().to_path_buf(),
            services_dir: dir.path().join("services"),
            socket_path: dir.path().join("control.sock"),
            lock_path: dir.path().join("wardend.pid"),
            log_path: dir.path().join("wardend.log"),
            state_path: dir.path().join("state.json"),
            secrets_path: dir.path().join("secrets.json"),
            router_path: Some(dir.path().join("routes.json")),
            tcp_addr: None,
            auth_token: None,
            port_range: (port_min, port_max),
            stop_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_millis(100),
            adopt_redeploy_wait: Duration::from_secs(600),
        };
        let secrets = Arc::new(FileSecretStore::new(config.secrets_path.clone()));
        let router = Arc::new(FileRouter::new(dir.path().join("routes.json")));
        let sup = Supervisor::new(config, secrets, Some(router));
        Self { dir, sup }
    }

    pub fn write_spec(&self, file: &str, yaml: &str) {
        let services = self.dir.path().join("services");
        std::fs::create_dir_all(&services).unwrap();
        std::fs::write(services.join(file), yaml).unwrap();
    }

    pub fn router_config(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("routes.json")).unwrap_or_default()
    }
}

/// Poll until `cond` holds or the deadline passes.
pub async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// True when the pid is visible to a zero-signal probe.
pub fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

/// Force-kill a leftover test process.
pub fn kill_pid(pid: u32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    );
}
