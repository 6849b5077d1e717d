// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waiting on spawned calls and racing work against operation failure.

use crate::coordinator::OperationFailedInfo;
use crate::error::EngineError;
use crate::operation::Session;
use crate::spawned::SpawnedCall;
use dpl_core::OperationState;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of waiting on a set of spawned calls.
pub struct SyncResult<T> {
    pub successful: Vec<SpawnedCall<T>>,
    pub failed: Vec<SpawnedCall<T>>,
    /// Calls still pending when the wait ended early (operation failure
    /// or timeout).
    pub unknown: Vec<SpawnedCall<T>>,
    /// The operation entered cleanup/failed while waiting.
    pub operation_failed: bool,
}

impl<T> SyncResult<T> {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.unknown.is_empty() && !self.operation_failed
    }

    pub fn has_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn all_resolved(&self) -> bool {
        self.unknown.is_empty()
    }
}

impl<T> std::fmt::Debug for SyncResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncResult")
            .field("successful", &self.successful.len())
            .field("failed", &self.failed.len())
            .field("unknown", &self.unknown.len())
            .field("operation_failed", &self.operation_failed)
            .finish()
    }
}

/// Wait for every call to resolve, or for the operation to fail, or for
/// the optional timeout, whichever comes first.
pub async fn sync_calls<T: Clone + Send + Sync + 'static>(
    session: &Session,
    calls: Vec<SpawnedCall<T>>,
    timeout: Option<Duration>,
) -> SyncResult<T> {
    let mut state_rx = session.state_watch();
    let all = futures_util::future::join_all(calls.iter().map(|c| {
        let c = c.clone();
        async move {
            let _ = c.wait().await;
        }
    }));

    let mut operation_failed = false;
    tokio::select! {
        _ = all => {}
        _ = failure_observed(&mut state_rx) => {
            operation_failed = true;
        }
        _ = maybe_sleep(timeout) => {}
    }

    partition(calls, operation_failed)
}

/// Wait for one spawned call, racing operation failure.
pub async fn await_call<T: Clone + Send + Sync + 'static>(
    session: &Session,
    call: &SpawnedCall<T>,
) -> Result<T, EngineError> {
    let mut state_rx = session.state_watch();
    tokio::select! {
        result = call.wait() => result,
        _ = failure_observed(&mut state_rx) => Err(operation_failed_error(session)),
    }
}

/// Race `work` against a failure watcher derived from the document
/// state. Returns the work's result, or `OperationFailed` if cleanup
/// starts while the work is still running.
pub async fn wait_for_completion<T, F>(session: &Session, work: F) -> Result<T, EngineError>
where
    F: Future<Output = T>,
{
    let mut state_rx = session.state_watch();
    tokio::select! {
        value = work => Ok(value),
        _ = failure_observed(&mut state_rx) => Err(operation_failed_error(session)),
    }
}

fn operation_failed_error(session: &Session) -> EngineError {
    let info: Option<OperationFailedInfo> = session.failure_watch().borrow().clone();
    EngineError::OperationFailed {
        operation_id: session.operation_id().clone(),
        crashed: info.map(|i| i.crashed_call_ids).unwrap_or_default(),
    }
}

/// Resolves when the locally-observed state enters cleanup or failed.
async fn failure_observed(rx: &mut watch::Receiver<OperationState>) {
    loop {
        {
            let state = *rx.borrow_and_update();
            if matches!(state, OperationState::Cleanup | OperationState::Failed) {
                return;
            }
        }
        if rx.changed().await.is_err() {
            // Sender gone: the handle is being torn down; never resolve
            std::future::pending::<()>().await;
        }
    }
}

async fn maybe_sleep(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending().await,
    }
}

fn partition<T: Clone + Send + Sync + 'static>(
    calls: Vec<SpawnedCall<T>>,
    operation_failed: bool,
) -> SyncResult<T> {
    let mut result = SyncResult {
        successful: Vec::new(),
        failed: Vec::new(),
        unknown: Vec::new(),
        operation_failed,
    };
    for call in calls {
        if call.is_success() {
            result.successful.push(call);
        } else if call.is_failed() || call.is_cancelled() {
            result.failed.push(call);
        } else {
            result.unknown.push(call);
        }
    }
    result
}
