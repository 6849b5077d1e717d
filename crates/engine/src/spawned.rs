// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous spawned calls.
//!
//! A [`SpawnedCall`] is a task handle plus a state record behind a
//! mutex. Cancellation is cooperative (the work function polls its
//! [`SpawnContext`]); `kill` forcefully signals an attached child
//! process. The frame is removed when the work resolves, success or not.

use crate::error::{join_err, EngineError};
use crate::hooks::CleanupFn;
use crate::operation::OperationShared;
use dpl_core::{CallId, Clock, SystemClock};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Options for [`Session::spawn_call`](crate::Session::spawn_call).
pub struct SpawnOptions {
    pub description: Option<String>,
    /// When true (the default), a failure aborts the whole operation.
    pub fail_on_crash: bool,
    /// Local cleanup run when the work fails.
    pub on_cleanup: Option<CleanupFn>,
    /// Invoked once when the call is cancelled.
    pub on_cancel: Option<CleanupFn>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self { description: None, fail_on_crash: true, on_cleanup: None, on_cancel: None }
    }
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn described(description: impl Into<String>) -> Self {
        Self { description: Some(description.into()), ..Self::default() }
    }

    pub fn contained(mut self) -> Self {
        self.fail_on_crash = false;
        self
    }
}

/// Handed to the work function: cancellation and child attachment.
#[derive(Clone)]
pub struct SpawnContext {
    pub call_id: CallId,
    cancel: CancellationToken,
    child_pid: Arc<Mutex<Option<u32>>>,
}

impl SpawnContext {
    /// Cooperative cancellation: the work function is expected to poll
    /// this (or await [`cancelled`](Self::cancelled)).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Attach a child process so `kill` can reach it.
    pub fn attach_child_pid(&self, pid: u32) {
        *self.child_pid.lock() = Some(pid);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

struct SpawnedState<T> {
    status: SpawnStatus,
    result: Option<T>,
    error: Option<String>,
    stack_trace: Option<String>,
}

struct SpawnedInner<T> {
    shared: Arc<OperationShared>,
    call_id: CallId,
    fail_on_crash: bool,
    state: Mutex<SpawnedState<T>>,
    done: watch::Sender<bool>,
    cancel: CancellationToken,
    child_pid: Arc<Mutex<Option<u32>>>,
    on_cancel: Mutex<Option<CleanupFn>>,
    on_cleanup: Option<CleanupFn>,
}

/// Cloneable handle for one spawned call.
pub struct SpawnedCall<T> {
    inner: Arc<SpawnedInner<T>>,
}

impl<T> Clone for SpawnedCall<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Clone + Send + Sync + 'static> SpawnedCall<T> {
    pub(crate) fn spawn<F, Fut>(
        shared: Arc<OperationShared>,
        call_id: CallId,
        opts: SpawnOptions,
        cancel: CancellationToken,
        work: F,
    ) -> Self
    where
        F: FnOnce(SpawnContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let inner = Arc::new(SpawnedInner {
            shared,
            call_id: call_id.clone(),
            fail_on_crash: opts.fail_on_crash,
            state: Mutex::new(SpawnedState {
                status: SpawnStatus::Pending,
                result: None,
                error: None,
                stack_trace: None,
            }),
            done: watch::Sender::new(false),
            cancel,
            child_pid: Arc::new(Mutex::new(None)),
            on_cancel: Mutex::new(opts.on_cancel),
            on_cleanup: opts.on_cleanup,
        });

        let ctx = SpawnContext {
            call_id,
            cancel: inner.cancel.clone(),
            child_pid: Arc::clone(&inner.child_pid),
        };
        let driver = Arc::clone(&inner);
        tokio::spawn(async move {
            let outcome = work(ctx).await;
            finish(driver, outcome).await;
        });

        Self { inner }
    }

    pub fn call_id(&self) -> &CallId {
        &self.inner.call_id
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().status != SpawnStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.inner.state.lock().status == SpawnStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.inner.state.lock().status == SpawnStatus::Failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
            || self.inner.state.lock().status == SpawnStatus::Cancelled
    }

    pub fn result(&self) -> Option<T> {
        self.inner.state.lock().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn stack_trace(&self) -> Option<String> {
        self.inner.state.lock().stack_trace.clone()
    }

    /// The result, or `default` when the call did not succeed (yet).
    pub fn result_or(&self, default: T) -> T {
        self.result().unwrap_or(default)
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        {
            let mut state = self.inner.state.lock();
            if state.status == SpawnStatus::Pending {
                state.status = SpawnStatus::Cancelled;
            }
        }
        if let Some(on_cancel) = self.inner.on_cancel.lock().take() {
            on_cancel();
        }
        debug!(call = %self.inner.call_id, "spawned call cancelled");
    }

    /// Deliver `signal` (default SIGTERM) to the attached child process.
    /// Returns whether a child was attached.
    pub fn kill(&self, signal: Option<nix::sys::signal::Signal>) -> bool {
        let pid = *self.inner.child_pid.lock();
        match pid {
            Some(pid) => {
                let sig = signal.unwrap_or(nix::sys::signal::Signal::SIGTERM);
                if let Err(e) =
                    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), sig)
                {
                    warn!(call = %self.inner.call_id, pid, error = %e, "kill failed");
                }
                true
            }
            None => false,
        }
    }

    /// Wait for the call to resolve.
    pub async fn wait(&self) -> Result<T, EngineError> {
        let mut done = self.inner.done.subscribe();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
        let state = self.inner.state.lock();
        match state.status {
            SpawnStatus::Success => state.result.clone().ok_or_else(|| {
                EngineError::state(format!("call {} resolved without result", self.inner.call_id))
            }),
            SpawnStatus::Failed => Err(EngineError::CallFailed {
                call_id: self.inner.call_id.clone(),
                message: state.error.clone().unwrap_or_else(|| "unknown error".into()),
            }),
            SpawnStatus::Cancelled => {
                Err(EngineError::CallCancelled(self.inner.call_id.clone()))
            }
            SpawnStatus::Pending => Err(EngineError::state(format!(
                "call {} did not resolve",
                self.inner.call_id
            ))),
        }
    }
}

/// Record the outcome, close the frame, notify waiters.
async fn finish<T: Send + Sync + 'static>(
    inner: Arc<SpawnedInner<T>>,
    outcome: Result<T, EngineError>,
) {
    let failed = {
        let mut state = inner.state.lock();
        let status = state.status;
        match (status, outcome) {
            // Cancellation wins over a late result
            (SpawnStatus::Cancelled, _) => false,
            (_, Ok(value)) => {
                state.status = SpawnStatus::Success;
                state.result = Some(value);
                false
            }
            (_, Err(e)) => {
                state.status = SpawnStatus::Failed;
                state.error = Some(e.to_string());
                true
            }
        }
    };

    if failed {
        if let Some(cleanup) = &inner.on_cleanup {
            cleanup();
        }
    }

    // Close the frame; on a fail-fast error this also raises the abort
    // flag so siblings wind down cooperatively.
    let set_aborted = failed && inner.fail_on_crash;
    let shared = Arc::clone(&inner.shared);
    let call_id = inner.call_id.clone();
    let now = SystemClock.now_utc();
    let removal = tokio::task::spawn_blocking(move || {
        shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
            doc.remove_frame(&call_id);
            if set_aborted {
                doc.aborted = true;
            }
            Ok(())
        })
    })
    .await
    .map_err(join_err);
    match removal {
        Ok(Ok(())) | Ok(Err(dpl_store::StoreError::NotFound(_))) => {}
        Ok(Err(e)) => {
            warn!(call = %inner.call_id, error = %e, "failed to remove spawned call frame")
        }
        Err(e) => warn!(call = %inner.call_id, error = %e, "frame removal task failed"),
    }

    inner.shared.open_calls.lock().remove(&inner.call_id);
    inner.done.send_replace(true);
}
