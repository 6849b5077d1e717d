// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-operation heartbeat task.
//!
//! Every tick runs one read-modify-write transaction: refresh our own
//! timestamps, look at the global state, and perform whatever phase of
//! the cleanup protocol is due. User hooks run strictly after the lock
//! is released.
//!
//! The first tick to observe a stale peer becomes the cleanup
//! coordinator and executes Phase 1 before unlocking. A tick that meets
//! an expired phase predicate on a document someone else was driving
//! inherits coordination; phases are idempotent so a duplicate
//! coordinator is harmless.

use crate::coordinator::{self, OperationFailedInfo};
use crate::operation::OperationShared;
use crate::hooks::ParticipantRole;
use dpl_core::{
    Clock, ErrorKind, Frame, OperationDoc, OperationId, OperationState, ParticipantId, SystemClock,
};
use dpl_store::StoreError;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Snapshot delivered to `on_heartbeat_success`.
#[derive(Debug, Clone)]
pub struct HeartbeatResult {
    pub operation_id: OperationId,
    /// Document as read at the start of the transaction.
    pub before: Box<OperationDoc>,
    /// Document as written.
    pub after: Box<OperationDoc>,
    /// Heartbeat age per participant at tick time.
    pub participant_ages: BTreeMap<ParticipantId, Duration>,
    /// Participants found past the staleness threshold this tick.
    pub stale_participants: Vec<ParticipantId>,
}

/// Error delivered to `on_heartbeat_error`.
#[derive(Debug, Clone)]
pub struct HeartbeatError {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: Option<String>,
}

impl HeartbeatError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause: None }
    }

    fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: impl ToString) -> Self {
        Self { kind, message: message.into(), cause: Some(cause.to_string()) }
    }
}

impl std::fmt::Display for HeartbeatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HeartbeatError {}

/// Everything one transaction decided, applied after unlock.
#[derive(Default)]
struct TickEvents {
    abort_observed: bool,
    became_coordinator: bool,
    stale_participants: Vec<ParticipantId>,
    self_cleaned: bool,
    drained: Vec<Frame>,
    failed: Option<OperationFailedInfo>,
    delete_file: bool,
    stop: bool,
}

struct TickReport {
    before: OperationDoc,
    after: OperationDoc,
    events: TickEvents,
}

pub(crate) fn spawn_heartbeat(shared: Arc<OperationShared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = shared.config.heartbeat_interval + jitter(&shared);
            tokio::select! {
                _ = shared.hb_cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            let stop = run_tick(&shared).await;
            if stop {
                break;
            }
        }
        debug!(operation = %shared.operation_id, "heartbeat stopped");
    })
}

/// One manual heartbeat (used by `Session::heartbeat_now` and the HTTP
/// surface). Hook delivery and watch resolution happen exactly as on a
/// timer tick.
pub(crate) async fn heartbeat_once(
    shared: &Arc<OperationShared>,
) -> Result<HeartbeatResult, HeartbeatError> {
    let (outcome, stop) = tick(shared).await;
    if stop {
        shared.stop_heartbeat();
    }
    outcome
}

/// Timer-loop wrapper: returns whether the loop should stop.
async fn run_tick(shared: &Arc<OperationShared>) -> bool {
    let (_, stop) = tick(shared).await;
    stop
}

async fn tick(shared: &Arc<OperationShared>) -> (Result<HeartbeatResult, HeartbeatError>, bool) {
    let now = SystemClock.now_utc();
    let am_coordinator = shared.coordinator.load(Ordering::Acquire);
    let abort_seen = shared.abort_observed.load(Ordering::Acquire);
    let already_cleaned = shared.self_cleaned.load(Ordering::Acquire);
    let supervisor_passes = shared.supervisor_passes.load(Ordering::Acquire);

    let role = match &shared.role {
        ParticipantRole::Call => None,
        ParticipantRole::Supervisor { supervisor_id, .. } => Some(supervisor_id.clone()),
    };

    let task_shared = Arc::clone(shared);
    let report = tokio::task::spawn_blocking(move || {
        transact(
            &task_shared,
            now,
            am_coordinator,
            abort_seen,
            already_cleaned,
            supervisor_passes,
            role,
        )
    })
    .await;

    let report = match report {
        Ok(r) => r,
        Err(e) => {
            let err = HeartbeatError::with_cause(ErrorKind::IoError, "heartbeat task failed", e);
            deliver_error(shared, &err);
            return (Err(err), false);
        }
    };

    let report = match report {
        Ok(r) => r,
        Err(StoreError::NotFound(id)) => {
            // Another process completed or deleted the operation; this
            // heartbeat's work is done.
            let err = HeartbeatError::new(
                ErrorKind::LedgerNotFound,
                format!("operation document gone: {id}"),
            );
            shared.terminated.store(true, Ordering::Release);
            deliver_error(shared, &err);
            return (Err(err), true);
        }
        Err(e @ StoreError::Lock(_)) => {
            // Contention: retried on the next tick.
            let err = HeartbeatError::with_cause(
                ErrorKind::LockFailed,
                "could not lock operation document",
                e,
            );
            deliver_error(shared, &err);
            return (Err(err), false);
        }
        Err(e) => {
            let err =
                HeartbeatError::with_cause(e.kind(), "heartbeat transaction failed", e);
            deliver_error(shared, &err);
            return (Err(err), false);
        }
    };

    (apply_events(shared, now, report).await, should_stop(shared))
}

/// The in-lock part: examine the document and apply due phase work.
fn transact(
    shared: &OperationShared,
    now: chrono::DateTime<chrono::Utc>,
    am_coordinator: bool,
    abort_seen: bool,
    already_cleaned: bool,
    supervisor_passes: u64,
    supervisor_id: Option<String>,
) -> Result<TickReport, StoreError> {
    let interval = shared.config.heartbeat_interval;
    let threshold = shared.config.stale_threshold;
    let participant = shared.participant_id.clone();

    shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
        let before = doc.clone();
        let mut events = TickEvents::default();

        match doc.operation_state {
            OperationState::Running => {
                doc.touch_heartbeat(&participant, now);
                if doc.aborted && !abort_seen {
                    events.abort_observed = true;
                }
                let outcome = coordinator::phase1_detect(doc, &participant, now, threshold);
                if outcome.elected {
                    events.became_coordinator = true;
                    events.stale_participants = outcome.stale_participants;
                    reclaim_paths(&outcome.reclaim);
                    // Coordinator self-cleans immediately (Phase 1 step 4)
                    let (_, own_reclaim) = coordinator::phase2_self_clean(doc, &participant);
                    reclaim_paths(&own_reclaim);
                    events.self_cleaned = true;
                }
            }
            OperationState::Cleanup => {
                if let Some(sup) = &supervisor_id {
                    events.drained = coordinator::phase2_supervisor_drain(doc, sup);
                    // First pass drains; one interval later a final pass
                    // catches stragglers, then the supervisor retires.
                    if supervisor_passes >= 1 && !am_coordinator {
                        events.stop = true;
                    }
                } else if !already_cleaned {
                    let (cleaned, reclaim) = coordinator::phase2_self_clean(doc, &participant);
                    reclaim_paths(&reclaim);
                    events.self_cleaned = cleaned;
                }
                // Phase 3 is timestamp-predicated; whoever meets it first
                // drives it, inheriting coordination if the original
                // coordinator died.
                if coordinator::phase3_due(doc, now, interval) {
                    let (info, reclaim) = coordinator::phase3_remove(doc, now);
                    reclaim_paths(&reclaim);
                    events.failed = Some(info);
                    events.became_coordinator = !am_coordinator;
                }
            }
            OperationState::Failed => {
                if am_coordinator {
                    if coordinator::phase4_due(doc, now, interval) {
                        events.delete_file = true;
                        events.stop = true;
                    }
                } else {
                    events.stop = true;
                }
            }
            OperationState::Completed => {
                events.stop = true;
            }
        }

        let after = doc.clone();
        Ok(TickReport { before, after, events })
    })
}

/// The after-unlock part: resolve watches, run hooks, delete the file.
async fn apply_events(
    shared: &Arc<OperationShared>,
    now: chrono::DateTime<chrono::Utc>,
    report: TickReport,
) -> Result<HeartbeatResult, HeartbeatError> {
    let TickReport { before, after, events } = report;

    shared.state_tx.send_replace(after.operation_state);

    if events.became_coordinator {
        shared.coordinator.store(true, Ordering::Release);
    }
    if events.self_cleaned {
        let first = !shared.self_cleaned.swap(true, Ordering::AcqRel);
        if first {
            if let Some(cleanup) = &shared.on_cleanup {
                cleanup();
            }
        }
    }
    if !events.drained.is_empty() || matches!(shared.role, ParticipantRole::Supervisor { .. }) {
        if after.operation_state == OperationState::Cleanup {
            shared.supervisor_passes.fetch_add(1, Ordering::AcqRel);
        }
        if let ParticipantRole::Supervisor { hooks, .. } = &shared.role {
            for frame in &events.drained {
                (hooks.on_call_cleanup)(frame);
                (hooks.on_call_crashed)(frame);
            }
        }
    }

    if after.operation_state == OperationState::Failed
        || after.operation_state == OperationState::Cleanup
    {
        // Pending local work is lost or must wind down: cancel open calls
        let open = shared.open_calls.lock();
        for reg in open.values() {
            if let Some(token) = &reg.cancel {
                token.cancel();
            }
        }
    }

    if after.operation_state == OperationState::Failed {
        let info = events.failed.clone().unwrap_or_else(|| OperationFailedInfo {
            operation_id: shared.operation_id.clone(),
            crashed_call_ids: Vec::new(),
        });
        shared.failure_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(info);
                true
            } else {
                false
            }
        });
    }

    if events.delete_file {
        let delete_shared = Arc::clone(shared);
        let result = tokio::task::spawn_blocking(move || {
            delete_shared.store.remove(&delete_shared.operation_id, delete_shared.holder())
        })
        .await;
        match result {
            Ok(Ok(())) | Ok(Err(StoreError::NotFound(_))) => {}
            Ok(Err(e)) => warn!(operation = %shared.operation_id, error = %e, "phase 4 removal failed"),
            Err(e) => warn!(operation = %shared.operation_id, error = %e, "phase 4 task failed"),
        }
        shared.terminated.store(true, Ordering::Release);
    }
    if events.stop {
        mark_stop(shared);
    }

    if events.abort_observed {
        shared.abort_observed.store(true, Ordering::Release);
        shared.abort_tx.send_replace(true);
    }

    // Error-kind ticks still carry the full observation via the error;
    // plain ticks deliver the result.
    if !events.stale_participants.is_empty() {
        let err = HeartbeatError::new(
            ErrorKind::HeartbeatStale,
            format!(
                "stale participant(s) detected: {}",
                events
                    .stale_participants
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        deliver_error(shared, &err);
        return Err(err);
    }
    if events.abort_observed {
        let err = HeartbeatError::new(ErrorKind::AbortFlagSet, "abort flag set");
        deliver_error(shared, &err);
        return Err(err);
    }

    let result = HeartbeatResult {
        operation_id: shared.operation_id.clone(),
        participant_ages: after.participant_ages(now),
        stale_participants: Vec::new(),
        before: Box::new(before),
        after: Box::new(after),
    };
    if let Some(on_success) = &shared.hooks.on_success {
        on_success(&result);
    }
    Ok(result)
}

fn deliver_error(shared: &OperationShared, err: &HeartbeatError) {
    if let Some(on_error) = &shared.hooks.on_error {
        on_error(err);
    }
}

fn mark_stop(shared: &OperationShared) {
    shared.hb_cancel.cancel();
}

fn should_stop(shared: &OperationShared) -> bool {
    shared.hb_cancel.is_cancelled()
}

/// Unlink reclaimed paths, tolerating already-gone files.
fn reclaim_paths(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "reclaimed resource"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to reclaim resource"),
        }
    }
}

/// Deterministic-enough jitter in `[0, jitter_max]`.
fn jitter(shared: &OperationShared) -> Duration {
    let max_ms = shared.config.heartbeat_jitter_max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let seq = shared.tick_seq.fetch_add(1, Ordering::Relaxed);
    let mut hasher = DefaultHasher::new();
    shared.operation_id.as_str().hash(&mut hasher);
    shared.pid.hash(&mut hasher);
    seq.hash(&mut hasher);
    SystemClock.epoch_ms().hash(&mut hasher);
    Duration::from_millis(hasher.finish() % (max_ms + 1))
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
