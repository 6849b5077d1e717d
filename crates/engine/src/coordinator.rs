// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The four-phase crash-cleanup protocol.
//!
//! Each phase is a pure transform over the operation document plus a list
//! of filesystem paths to reclaim; the heartbeat applies the transform
//! inside the document lock and unlinks the paths before releasing it.
//! Every phase is idempotent and predicated on document timestamps, so a
//! coordinator that dies mid-protocol is replaced by whichever surviving
//! heartbeat next meets the predicate.

use chrono::{DateTime, Utc};
use dpl_core::{CallId, Frame, FrameState, OperationDoc, OperationId, OperationState, ParticipantId};
use std::path::PathBuf;
use std::time::Duration;

/// Post-mortem summary handed to failure watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailedInfo {
    pub operation_id: OperationId,
    /// Calls whose `failOnCrash` was set when frames were mass-removed.
    pub crashed_call_ids: Vec<CallId>,
}

/// Result of Phase 1.
#[derive(Debug, Default)]
pub struct DetectionOutcome {
    /// Participants whose frames were found stale.
    pub stale_participants: Vec<ParticipantId>,
    /// Paths to unlink while still holding the lock.
    pub reclaim: Vec<PathBuf>,
    /// Whether this heartbeat performed the transition (false when a
    /// concurrent coordinator got there first).
    pub elected: bool,
}

/// Phase 1 — detection (`running -> cleanup`).
///
/// Stale unsupervised frames go straight to `cleanedUp` and their
/// declared resources are reclaimed by the coordinator; supervised stale
/// frames are marked `crashed` for their supervisor. Everyone else,
/// the coordinator included, must self-clean.
pub fn phase1_detect(
    doc: &mut OperationDoc,
    own: &ParticipantId,
    now: DateTime<Utc>,
    stale_threshold: Duration,
) -> DetectionOutcome {
    let mut outcome = DetectionOutcome::default();
    if doc.operation_state != OperationState::Running {
        return outcome;
    }
    let stale_ids: Vec<CallId> = doc
        .stale_frames(own, now, stale_threshold)
        .iter()
        .map(|f| f.call_id.clone())
        .collect();
    if stale_ids.is_empty() {
        return outcome;
    }

    for frame in &mut doc.call_frames {
        if stale_ids.contains(&frame.call_id) {
            if !outcome.stale_participants.contains(&frame.participant_id) {
                outcome.stale_participants.push(frame.participant_id.clone());
            }
            if frame.supervisor_id.is_some() {
                frame.state = FrameState::Crashed;
            } else {
                frame.state = FrameState::CleanedUp;
                outcome.reclaim.extend(frame.resources.iter().cloned());
            }
        } else if &frame.participant_id != own && frame.state == FrameState::Active {
            frame.state = FrameState::CleaningUp;
        }
    }
    // Temp resources owned by dead pids are reclaimed here too; the
    // owner can no longer do it.
    let dead_pids: Vec<u32> = doc
        .call_frames
        .iter()
        .filter(|f| stale_ids.contains(&f.call_id))
        .map(|f| f.pid)
        .collect();
    let reclaimed_paths: Vec<String> = doc
        .temp_resources
        .iter()
        .filter(|(_, r)| dead_pids.contains(&r.owner))
        .map(|(k, _)| k.clone())
        .collect();
    for key in reclaimed_paths {
        if let Some(res) = doc.temp_resources.remove(&key) {
            outcome.reclaim.push(res.path);
        }
    }

    // The coordinator's own frames self-clean like everyone else's.
    for frame in &mut doc.call_frames {
        if &frame.participant_id == own && frame.state == FrameState::Active {
            frame.state = FrameState::CleaningUp;
        }
    }

    doc.operation_state = OperationState::Cleanup;
    doc.detection_timestamp = Some(now);
    outcome.elected = true;
    outcome
}

/// Phase 2 (call side) — self-cleanup of this participant's frames.
///
/// A no-op for frames already terminal, so replays are safe.
pub fn phase2_self_clean(
    doc: &mut OperationDoc,
    own: &ParticipantId,
) -> (bool, Vec<PathBuf>) {
    let mut cleaned = false;
    let mut reclaim = Vec::new();
    for frame in &mut doc.call_frames {
        if &frame.participant_id == own
            && matches!(frame.state, FrameState::Active | FrameState::CleaningUp)
        {
            frame.state = FrameState::CleanedUp;
            reclaim.extend(frame.resources.iter().cloned());
            cleaned = true;
        }
    }
    (cleaned, reclaim)
}

/// Phase 2 (supervisor side) — drain frames registered to `supervisor_id`.
///
/// Returns the frames drained this pass (for the supervisor hooks).
pub fn phase2_supervisor_drain(doc: &mut OperationDoc, supervisor_id: &str) -> Vec<Frame> {
    let mut drained = Vec::new();
    for frame in &mut doc.call_frames {
        if frame.supervisor_id.as_deref() == Some(supervisor_id)
            && matches!(frame.state, FrameState::Crashed | FrameState::CleanedUp)
        {
            frame.state = FrameState::Dead;
            drained.push(frame.clone());
        }
    }
    drained
}

/// Whether the Phase 3 predicate holds.
pub fn phase3_due(doc: &OperationDoc, now: DateTime<Utc>, heartbeat_interval: Duration) -> bool {
    doc.operation_state == OperationState::Cleanup
        && doc
            .detection_timestamp
            .map(|t| age(t, now) >= 2 * heartbeat_interval)
            .unwrap_or(false)
}

/// Phase 3 — frame removal (`cleanup -> failed`).
///
/// Idempotent: once `callFrames` is empty and the state is `failed`,
/// there is nothing left to do.
pub fn phase3_remove(
    doc: &mut OperationDoc,
    now: DateTime<Utc>,
) -> (OperationFailedInfo, Vec<PathBuf>) {
    let mut reclaim = Vec::new();
    let mut crashed = Vec::new();
    for frame in &doc.call_frames {
        if frame.fail_on_crash {
            crashed.push(frame.call_id.clone());
        }
        // Frames nobody self-cleaned get their resources reclaimed now
        if !matches!(
            frame.state,
            FrameState::CleaningUp | FrameState::CleanedUp | FrameState::Dead
        ) {
            reclaim.extend(frame.resources.iter().cloned());
        }
    }
    doc.call_frames.clear();
    // Final sweep: any temp resource still registered is reclaimed
    let remaining: Vec<String> = doc.temp_resources.keys().cloned().collect();
    for key in remaining {
        if let Some(res) = doc.temp_resources.remove(&key) {
            reclaim.push(res.path);
        }
    }
    doc.operation_state = OperationState::Failed;
    doc.removal_timestamp = Some(now);
    (
        OperationFailedInfo { operation_id: doc.operation_id.clone(), crashed_call_ids: crashed },
        reclaim,
    )
}

/// Whether the Phase 4 predicate (file deletion) holds.
pub fn phase4_due(doc: &OperationDoc, now: DateTime<Utc>, heartbeat_interval: Duration) -> bool {
    doc.operation_state == OperationState::Failed
        && doc
            .removal_timestamp
            .map(|t| age(t, now) >= 2 * heartbeat_interval)
            .unwrap_or(false)
}

/// Successful-completion transform for the initiator's `complete()`.
///
/// The initiator's own frames may still be present; they are removed as
/// part of the same transaction. Any foreign frame is a conflict.
pub fn complete_transform(
    doc: &mut OperationDoc,
    participant: &ParticipantId,
) -> Result<(), dpl_core::DocumentError> {
    if &doc.initiator_id != participant {
        return Err(dpl_core::DocumentError::NotInitiator(participant.clone()));
    }
    let foreign = doc.call_frames.iter().filter(|f| &f.participant_id != participant).count();
    if foreign > 0 {
        return Err(dpl_core::DocumentError::FramesRemain(foreign));
    }
    doc.call_frames.clear();
    doc.set_state(OperationState::Completed)
}

fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
