// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide signal cleanup registry.
//!
//! Independent of the ledger: even when a document is locked or gone,
//! temp files local to this process are still reclaimed. Handlers are
//! installed at most once per process; every `Ledger` instance shares
//! the same registry.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Opaque handle for a registered cleanup callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupId(u64);

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Callbacks in registration order.
    callbacks: Vec<(u64, Callback)>,
    temp_paths: BTreeSet<PathBuf>,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| Mutex::new(Registry::default()))
}

/// Register a callback to run on SIGINT/SIGTERM (in registration order).
pub fn register_cleanup(callback: impl Fn() + Send + Sync + 'static) -> CleanupId {
    let mut reg = registry().lock();
    reg.next_id += 1;
    let id = CleanupId(reg.next_id);
    reg.callbacks.push((id.0, Arc::new(callback)));
    id
}

pub fn unregister_cleanup(id: CleanupId) {
    registry().lock().callbacks.retain(|(cb_id, _)| *cb_id != id.0);
}

/// Track a temp path for unlinking on signal exit.
pub fn track_temp_path(path: &Path) {
    registry().lock().temp_paths.insert(path.to_path_buf());
}

pub fn untrack_temp_path(path: &Path) {
    registry().lock().temp_paths.remove(path);
}

/// Currently tracked temp paths (diagnostics and tests).
pub fn tracked_temp_paths() -> Vec<PathBuf> {
    registry().lock().temp_paths.iter().cloned().collect()
}

/// Run every registered callback, then unlink every tracked temp path.
///
/// This is what the signal handler runs; it is public so shutdown paths
/// and tests can invoke the same sequence.
pub fn run_cleanup_now() {
    let (callbacks, paths) = {
        let reg = registry().lock();
        (reg.callbacks.clone(), reg.temp_paths.iter().cloned().collect::<Vec<_>>())
    };
    for (_, callback) in callbacks {
        callback();
    }
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed temp path"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp path"),
        }
    }
    registry().lock().temp_paths.clear();
}

/// Install the SIGINT/SIGTERM handlers. Idempotent; requires a running
/// tokio runtime (callers outside one get a warning and no handlers).
pub fn install_signal_handlers() {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(listen());
        }
        Err(_) => {
            INSTALLED.store(false, Ordering::Release);
            warn!("no tokio runtime; signal cleanup handlers not installed");
        }
    }
}

#[cfg(unix)]
async fn listen() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    let signo = tokio::select! {
        _ = sigint.recv() => 2,
        _ = sigterm.recv() => 15,
    };
    warn!(signal = signo, "signal received, running cleanup");
    run_cleanup_now();
    std::process::exit(128 + signo);
}

#[cfg(not(unix))]
async fn listen() {
    if tokio::signal::ctrl_c().await.is_ok() {
        run_cleanup_now();
        std::process::exit(130);
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
