// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named lock files guarding operation documents.
//!
//! A lock is a sibling file created with O_CREAT|O_EXCL, so creation is
//! the atomic acquisition. The payload records the holder; a lock whose
//! recorded pid is dead, or whose age exceeds the stale limit, is
//! forcibly reclaimed. Contention is handled by bounded retry.

use chrono::{DateTime, Utc};
use dpl_core::time_fmt::iso_ms;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// What the holder acquired the lock for. Informational; both kinds are
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOp {
    Read,
    Write,
}

/// JSON payload stored in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub holder_id: String,
    pub pid: u32,
    #[serde(with = "iso_ms")]
    pub acquired_at: DateTime<Utc>,
    pub op: LockOp,
}

/// Timing knobs for acquisition.
#[derive(Debug, Clone)]
pub struct LockSettings {
    pub timeout: Duration,
    pub retry_interval: Duration,
    pub stale_limit: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retry_interval: Duration::from_millis(50),
            stale_limit: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out acquiring lock at {path} (held by {holder:?})")]
    Timeout { path: PathBuf, holder: Option<String> },

    #[error("lock IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An acquired lock. Released on [`release`](LockGuard::release) or drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Acquire the lock at `path` for `holder_id`.
    ///
    /// Retries every `retry_interval` until `timeout`, reclaiming locks
    /// held by dead processes or older than `stale_limit`.
    pub fn acquire(
        path: &Path,
        holder_id: &str,
        op: LockOp,
        settings: &LockSettings,
    ) -> Result<Self, LockError> {
        let started = Instant::now();
        let mut last_holder: Option<String> = None;

        loop {
            match try_create(path, holder_id, op) {
                Ok(()) => {
                    debug!(path = %path.display(), holder = holder_id, "lock acquired");
                    return Ok(Self { path: path.to_path_buf(), released: false });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(info) = read_existing(path) {
                        last_holder = Some(format!("{} (pid {})", info.holder_id, info.pid));
                        if is_reclaimable(&info, settings.stale_limit) {
                            warn!(
                                path = %path.display(),
                                holder = %info.holder_id,
                                pid = info.pid,
                                "reclaiming stale lock"
                            );
                            let _ = fs::remove_file(path);
                            continue;
                        }
                    } else {
                        // Unreadable or malformed payload: treat as stale.
                        let _ = fs::remove_file(path);
                        continue;
                    }
                }
                Err(source) => {
                    return Err(LockError::Io { path: path.to_path_buf(), source })
                }
            }

            if started.elapsed() >= settings.timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    holder: last_holder,
                });
            }
            std::thread::sleep(settings.retry_interval);
        }
    }

    /// Delete the lock file.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io { path: self.path.clone(), source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// O_CREAT|O_EXCL create with the holder payload, fsynced so a reclaim
/// decision elsewhere never reads a torn payload.
fn try_create(path: &Path, holder_id: &str, op: LockOp) -> std::io::Result<()> {
    let info = LockInfo {
        holder_id: holder_id.to_string(),
        pid: std::process::id(),
        acquired_at: Utc::now(),
        op,
    };
    let payload = serde_json::to_vec(&info)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&payload)?;
    file.sync_all()?;
    Ok(())
}

fn read_existing(path: &Path) -> Option<LockInfo> {
    let data = fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Dead holder or expired age means the lock can be taken over.
fn is_reclaimable(info: &LockInfo, stale_limit: Duration) -> bool {
    if !pid_alive(info.pid) {
        return true;
    }
    let age = (Utc::now() - info.acquired_at).to_std().unwrap_or(Duration::ZERO);
    age > stale_limit
}

/// Signal-0 probe. EPERM still means the process exists.
fn pid_alive(pid: u32) -> bool {
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
