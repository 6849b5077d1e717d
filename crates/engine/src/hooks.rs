// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback surfaces for heartbeat, cleanup and supervision.
//!
//! Hooks are plain `Arc<dyn Fn>` values so handles stay cloneable. They
//! are always invoked *after* the document lock is released; a hook may
//! therefore call back into the ledger without deadlocking.

use crate::heartbeat::{HeartbeatError, HeartbeatResult};
use dpl_core::Frame;
use std::fmt;
use std::sync::Arc;

/// A local cleanup action (close files, stop timers, ...).
pub type CleanupFn = Arc<dyn Fn() + Send + Sync>;

/// Heartbeat observation hooks.
#[derive(Clone, Default)]
pub struct HeartbeatHooks {
    pub on_success: Option<Arc<dyn Fn(&HeartbeatResult) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&HeartbeatError) + Send + Sync>>,
}

impl fmt::Debug for HeartbeatHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatHooks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Hooks a supervising participant runs while draining crashed frames.
#[derive(Clone)]
pub struct SupervisorHooks {
    pub on_call_cleanup: Arc<dyn Fn(&Frame) + Send + Sync>,
    pub on_call_crashed: Arc<dyn Fn(&Frame) + Send + Sync>,
}

impl fmt::Debug for SupervisorHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SupervisorHooks")
    }
}

/// How this participant takes part in cleanup.
#[derive(Clone, Debug, Default)]
pub enum ParticipantRole {
    /// Ordinary call participant: self-cleans its frames in Phase 2.
    #[default]
    Call,
    /// Supervisor process: drains frames whose `supervisorId` matches.
    Supervisor { supervisor_id: String, hooks: SupervisorHooks },
}

/// Options shared by `create_operation` and `join_operation`.
#[derive(Clone, Default)]
pub struct JoinOptions {
    /// Pid recorded on frames; defaults to this process.
    pub participant_pid: Option<u32>,
    /// Participant-level local cleanup, run when cleanup reaches this
    /// process (Phase 1 for the coordinator, Phase 2 otherwise).
    pub on_cleanup: Option<CleanupFn>,
    pub heartbeat: HeartbeatHooks,
    pub role: ParticipantRole,
}

impl fmt::Debug for JoinOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinOptions")
            .field("participant_pid", &self.participant_pid)
            .field("on_cleanup", &self.on_cleanup.is_some())
            .field("heartbeat", &self.heartbeat)
            .field("role", &self.role)
            .finish()
    }
}
