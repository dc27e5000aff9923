// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec-directory watcher: filesystem events trigger a debounced reload.

use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::Supervisor;

/// Quiet window after the last event before a reload fires.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watch the spec directory and reload after bursts of changes settle.
///
/// The returned watcher must be kept alive; dropping it stops event
/// delivery. The reload task exits on supervisor cancellation.
pub fn spawn(supervisor: Arc<Supervisor>) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                // Create, write, remove, and rename all land here
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "spec watcher event error"),
        }
    })?;

    let dir = supervisor.config().services_dir.clone();
    std::fs::create_dir_all(&dir).ok();
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(dir = %dir.display(), "watching spec directory");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = supervisor.lifecycle().cancelled() => break,
                event = rx.recv() => {
                    if event.is_none() {
                        break;
                    }
                    // Debounce: successive events reset the quiet window
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(DEBOUNCE) => break,
                            more = rx.recv() => {
                                if more.is_none() {
                                    break;
                                }
                                debug!("spec change burst continues");
                            }
                        }
                    }
                    info!("spec directory changed; reloading");
                    if let Err(e) = supervisor.reload().await {
                        warn!(error = %e, "reload after spec change failed");
                    }
                }
            }
        }
    });

    Ok(watcher)
}
