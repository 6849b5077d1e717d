// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! The ledger persists wall-clock timestamps, so the clock deals in
//! `DateTime<Utc>` rather than monotonic instants. Staleness and phase
//! predicates compare document timestamps against `now_utc()`, which lets
//! tests drive the cleanup state machine with a [`FakeClock`] instead of
//! sleeping.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A clock that provides the current wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64 {
        self.now_utc().timestamp_millis().max(0) as u64
    }
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    /// Start at a fixed, arbitrary epoch so tests are reproducible.
    pub fn new() -> Self {
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap_or_else(Utc::now);
        Self { current: Arc::new(Mutex::new(start)) }
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self { current: Arc::new(Mutex::new(start)) }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let delta = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        *self.current.lock() += delta;
    }

    /// Set the clock to a specific time.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.lock() = time;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
