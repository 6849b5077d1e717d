// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ledger configuration and validation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "stale threshold {threshold:?} below minimum {minimum:?} \
         (must be at least 3 x heartbeat interval)"
    )]
    StaleThresholdTooLow { threshold: Duration, minimum: Duration },

    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeatInterval,
}

/// Tunables for one [`Ledger`](../../dpl_engine) instance.
///
/// Defaults follow the documented protocol timings; anything
/// deployment-specific (base path) has no default.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Directory holding operation documents, locks, trails and backups.
    pub base_path: PathBuf,
    /// Per-operation heartbeat period.
    pub heartbeat_interval: Duration,
    /// Upper bound of the per-tick random jitter added to the period.
    pub heartbeat_jitter_max: Duration,
    /// A peer is stale when `now - lastHeartbeat` exceeds this.
    pub stale_threshold: Duration,
    /// Bound on one lock acquisition attempt.
    pub lock_timeout: Duration,
    /// Sleep between lock retries.
    pub lock_retry_interval: Duration,
    /// A held lock older than this is forcibly reclaimed.
    pub stale_lock_limit: Duration,
    /// Trail/backup snapshots kept per operation.
    pub max_backups: usize,
    /// When false, terminal documents are deleted instead of moved to
    /// `backups/`.
    pub backups_enabled: bool,
    /// Cadence of the ledger-wide read-only staleness sweep.
    pub global_heartbeat_interval: Duration,
}

impl LedgerConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            heartbeat_interval: Duration::from_millis(4_500),
            heartbeat_jitter_max: Duration::from_millis(500),
            stale_threshold: Duration::from_secs(15),
            lock_timeout: Duration::from_secs(2),
            lock_retry_interval: Duration::from_millis(50),
            stale_lock_limit: Duration::from_secs(2),
            max_backups: 20,
            backups_enabled: true,
            global_heartbeat_interval: Duration::from_secs(5),
        }
    }

    /// Check the timing constraints. The staleness threshold must leave a
    /// crashed participant at least three missed heartbeats before any
    /// peer starts cleanup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        let minimum = 3 * self.heartbeat_interval;
        if self.stale_threshold < minimum {
            return Err(ConfigError::StaleThresholdTooLow {
                threshold: self.stale_threshold,
                minimum,
            });
        }
        Ok(())
    }

    /// Fast timings for tests.
    pub fn for_tests(base_path: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::new(base_path);
        cfg.heartbeat_interval = Duration::from_millis(100);
        cfg.heartbeat_jitter_max = Duration::from_millis(10);
        cfg.stale_threshold = Duration::from_millis(400);
        cfg.lock_timeout = Duration::from_millis(500);
        cfg.lock_retry_interval = Duration::from_millis(10);
        cfg.stale_lock_limit = Duration::from_millis(500);
        cfg.global_heartbeat_interval = Duration::from_millis(250);
        cfg
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn with_backups_enabled(mut self, enabled: bool) -> Self {
        self.backups_enabled = enabled;
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
