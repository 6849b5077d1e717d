// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level errors.

use dpl_core::{CallId, ErrorKind, OperationId};
use dpl_store::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("call not found: {0}")]
    CallNotFound(CallId),

    #[error("invalid state: {0}")]
    State(String),

    #[error("operation {operation_id} failed (crashed calls: {crashed:?})")]
    OperationFailed { operation_id: OperationId, crashed: Vec<CallId> },

    #[error("operation aborted")]
    Aborted,

    #[error("call {call_id} failed: {message}")]
    CallFailed { call_id: CallId, message: String },

    #[error("call {0} cancelled")]
    CallCancelled(CallId),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl EngineError {
    pub fn state(message: impl Into<String>) -> Self {
        EngineError::State(message.into())
    }

    /// Classification for callbacks and the wire.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::OperationNotFound(_) => ErrorKind::LedgerNotFound,
            EngineError::CallNotFound(_) => ErrorKind::NotFound,
            EngineError::State(_) => ErrorKind::StateConflict,
            EngineError::OperationFailed { .. } => ErrorKind::OperationFailed,
            EngineError::Aborted => ErrorKind::AbortFlagSet,
            EngineError::CallFailed { .. } => ErrorKind::OperationFailed,
            EngineError::CallCancelled(_) => ErrorKind::StateConflict,
            EngineError::Timeout(_) => ErrorKind::IoError,
            EngineError::Store(e) => e.kind(),
            EngineError::Task(_) => ErrorKind::IoError,
        }
    }
}

/// Map a blocking-task join failure.
pub(crate) fn join_err(e: tokio::task::JoinError) -> EngineError {
    EngineError::Task(e.to_string())
}
