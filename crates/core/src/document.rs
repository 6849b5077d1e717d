// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The operation document: one JSON file per operation.
//!
//! The document is the only shared mutable state between participants.
//! Every mutation goes through the store's read-modify-write transaction;
//! the helpers here enforce the local invariants (monotonic heartbeats,
//! unique call ids, the state-transition DAG) so callers cannot produce
//! an invalid document by construction.
//!
//! Wire format: camelCase field names, ISO-8601 millisecond timestamps,
//! lowercase/camelCase enum values. Unknown fields are preserved across a
//! round-trip; unknown enum values degrade to the non-terminal default
//! with a warning.

use crate::id::{CallId, OperationId, ParticipantId};
use crate::time_fmt::{iso_ms, iso_ms_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from document-level validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("invalid operation state transition: {from} -> {to}")]
    InvalidTransition { from: OperationState, to: OperationState },

    #[error("call id already present in operation: {0}")]
    DuplicateCallId(CallId),

    #[error("no frame for call id: {0}")]
    UnknownCall(CallId),

    #[error("participant {0} is not the initiator")]
    NotInitiator(ParticipantId),

    #[error("operation still has {0} open call frame(s)")]
    FramesRemain(usize),

    #[error("operation is {0}, not running")]
    NotRunning(OperationState),
}

/// Global lifecycle state of an operation.
///
/// Transitions form a DAG: `running -> cleanup -> failed` and
/// `running -> completed`. No cycles, no reverse moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Running,
    Cleanup,
    Failed,
    Completed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Running => "running",
            OperationState::Cleanup => "cleanup",
            OperationState::Failed => "failed",
            OperationState::Completed => "completed",
        }
    }

    /// Whether the state DAG admits `self -> to`. Self-transitions are
    /// allowed (idempotent replays).
    pub fn can_transition(self, to: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, to),
            (Running, Cleanup) | (Cleanup, Failed) | (Running, Completed)
        ) || self == to
    }

    /// Terminal states admit no further lifecycle transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Failed | OperationState::Completed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OperationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "running" => OperationState::Running,
            "cleanup" => OperationState::Cleanup,
            "failed" => OperationState::Failed,
            "completed" => OperationState::Completed,
            other => {
                tracing::warn!(value = other, "unknown operation state, treating as running");
                OperationState::Running
            }
        })
    }
}

/// Lifecycle state of one call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Active,
    /// Participant's heartbeat went stale; a supervisor will drain it.
    Crashed,
    /// Owner must run its local cleanup on its next heartbeat.
    CleaningUp,
    CleanedUp,
    /// Drained by the supervisor.
    Dead,
}

impl FrameState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameState::Active => "active",
            FrameState::Crashed => "crashed",
            FrameState::CleaningUp => "cleaningUp",
            FrameState::CleanedUp => "cleanedUp",
            FrameState::Dead => "dead",
        }
    }

    /// Replaying a cleanup step on a terminal frame is a no-op.
    pub fn is_terminal(self) -> bool {
        matches!(self, FrameState::CleanedUp | FrameState::Dead)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FrameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FrameState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "active" => FrameState::Active,
            "crashed" => FrameState::Crashed,
            "cleaningUp" => FrameState::CleaningUp,
            "cleanedUp" => FrameState::CleanedUp,
            "dead" => FrameState::Dead,
            other => {
                tracing::warn!(value = other, "unknown frame state, treating as active");
                FrameState::Active
            }
        })
    }
}

/// Persistent record of one call within an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub participant_id: ParticipantId,
    pub call_id: CallId,
    /// Pid of the owning process.
    pub pid: u32,
    #[serde(with = "iso_ms")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "iso_ms")]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub state: FrameState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Paths this call declares ownership of; reclaimed on crash cleanup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<PathBuf>,
    /// When true, a crash of this frame fails the whole operation.
    #[serde(default)]
    pub fail_on_crash: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_handle: Option<String>,
    /// Fields from newer writers, preserved on round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Frame {
    pub fn new(
        participant_id: ParticipantId,
        call_id: CallId,
        pid: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            participant_id,
            call_id,
            pid,
            start_time: now,
            last_heartbeat: now,
            state: FrameState::Active,
            description: None,
            resources: Vec::new(),
            fail_on_crash: true,
            supervisor_id: None,
            supervisor_handle: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now) > threshold
    }
}

/// A filesystem path registered for guaranteed cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempResource {
    pub path: PathBuf,
    /// Pid of the owning process.
    pub owner: u32,
    #[serde(with = "iso_ms")]
    pub registered_at: DateTime<Utc>,
}

/// The shared operation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDoc {
    pub operation_id: OperationId,
    pub initiator_id: ParticipantId,
    #[serde(with = "iso_ms")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "iso_ms")]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub operation_state: OperationState,
    /// When `running -> cleanup` occurred.
    #[serde(default, with = "iso_ms_opt", skip_serializing_if = "Option::is_none")]
    pub detection_timestamp: Option<DateTime<Utc>>,
    /// When frames were mass-removed.
    #[serde(default, with = "iso_ms_opt", skip_serializing_if = "Option::is_none")]
    pub removal_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub call_frames: Vec<Frame>,
    /// Keyed by path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub temp_resources: BTreeMap<String, TempResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields from newer writers, preserved on round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OperationDoc {
    pub fn new(
        operation_id: OperationId,
        initiator_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_id,
            initiator_id,
            start_time: now,
            last_heartbeat: now,
            aborted: false,
            operation_state: OperationState::Running,
            detection_timestamp: None,
            removal_timestamp: None,
            call_frames: Vec::new(),
            temp_resources: BTreeMap::new(),
            description: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Move the operation along the state DAG.
    pub fn set_state(&mut self, to: OperationState) -> Result<(), DocumentError> {
        if !self.operation_state.can_transition(to) {
            return Err(DocumentError::InvalidTransition { from: self.operation_state, to });
        }
        self.operation_state = to;
        Ok(())
    }

    /// Advance the document heartbeat and every active frame owned by
    /// `participant`. Never moves a timestamp backwards.
    pub fn touch_heartbeat(&mut self, participant: &ParticipantId, now: DateTime<Utc>) {
        if now > self.last_heartbeat {
            self.last_heartbeat = now;
        }
        for frame in &mut self.call_frames {
            if &frame.participant_id == participant && now > frame.last_heartbeat {
                frame.last_heartbeat = now;
            }
        }
    }

    /// Append a frame, enforcing call-id uniqueness.
    pub fn push_frame(&mut self, frame: Frame) -> Result<(), DocumentError> {
        if self.frame(&frame.call_id).is_some() {
            return Err(DocumentError::DuplicateCallId(frame.call_id));
        }
        self.call_frames.push(frame);
        Ok(())
    }

    pub fn frame(&self, call_id: &CallId) -> Option<&Frame> {
        self.call_frames.iter().find(|f| &f.call_id == call_id)
    }

    pub fn frame_mut(&mut self, call_id: &CallId) -> Option<&mut Frame> {
        self.call_frames.iter_mut().find(|f| &f.call_id == call_id)
    }

    pub fn remove_frame(&mut self, call_id: &CallId) -> Option<Frame> {
        let idx = self.call_frames.iter().position(|f| &f.call_id == call_id)?;
        Some(self.call_frames.remove(idx))
    }

    pub fn frames_of<'a>(
        &'a self,
        participant: &'a ParticipantId,
    ) -> impl Iterator<Item = &'a Frame> {
        self.call_frames.iter().filter(move |f| &f.participant_id == participant)
    }

    /// Active frames of other participants whose heartbeat is past the
    /// staleness threshold.
    pub fn stale_frames(
        &self,
        own: &ParticipantId,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Vec<&Frame> {
        self.call_frames
            .iter()
            .filter(|f| {
                &f.participant_id != own
                    && f.state == FrameState::Active
                    && f.is_stale(now, threshold)
            })
            .collect()
    }

    /// Heartbeat age per participant (age of its freshest frame).
    pub fn participant_ages(&self, now: DateTime<Utc>) -> BTreeMap<ParticipantId, Duration> {
        let mut ages: BTreeMap<ParticipantId, Duration> = BTreeMap::new();
        for frame in &self.call_frames {
            let age = frame.age(now);
            ages.entry(frame.participant_id.clone())
                .and_modify(|a| *a = (*a).min(age))
                .or_insert(age);
        }
        ages
    }

    pub fn register_temp_resource(&mut self, path: &Path, owner: u32, now: DateTime<Utc>) {
        self.temp_resources.insert(
            path.to_string_lossy().into_owned(),
            TempResource { path: path.to_path_buf(), owner, registered_at: now },
        );
    }

    pub fn unregister_temp_resource(&mut self, path: &Path) -> Option<TempResource> {
        self.temp_resources.remove(path.to_string_lossy().as_ref())
    }

    pub fn is_terminal(&self) -> bool {
        self.operation_state.is_terminal()
    }
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
