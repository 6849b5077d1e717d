// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous call brackets.
//!
//! A [`Call`] pairs a frame in the shared document with local callbacks.
//! `end` and `fail` close the bracket exactly once; a second close is a
//! state error.

use crate::error::{join_err, EngineError};
use crate::hooks::CleanupFn;
use crate::operation::OperationShared;
use dpl_core::{CallId, Clock, SystemClock};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Options for [`Session::start_call`](crate::Session::start_call).
pub struct CallOptions<T> {
    pub description: Option<String>,
    /// When true (the default), failing this call aborts the whole
    /// operation; when false, the failure stays contained.
    pub fail_on_crash: bool,
    /// Paths this call owns; reclaimed by crash cleanup.
    pub resources: Vec<PathBuf>,
    pub supervisor_id: Option<String>,
    pub supervisor_handle: Option<String>,
    /// Receives the result when the call ends. `None` when the call
    /// ended without a value.
    pub on_completion: Option<Box<dyn FnOnce(Option<&T>) + Send>>,
    /// Local cleanup for the failure path.
    pub on_cleanup: Option<CleanupFn>,
}

impl<T> Default for CallOptions<T> {
    fn default() -> Self {
        Self {
            description: None,
            fail_on_crash: true,
            resources: Vec::new(),
            supervisor_id: None,
            supervisor_handle: None,
            on_completion: None,
            on_cleanup: None,
        }
    }
}

impl<T> CallOptions<T> {
    pub fn described(description: impl Into<String>) -> Self {
        Self { description: Some(description.into()), ..Self::default() }
    }

    pub fn contained(mut self) -> Self {
        self.fail_on_crash = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallLifecycle {
    Open,
    Closing,
    Completed,
    Failed,
}

/// Handle for one open synchronous call.
pub struct Call<T> {
    shared: Arc<OperationShared>,
    call_id: CallId,
    fail_on_crash: bool,
    on_completion: Mutex<Option<Box<dyn FnOnce(Option<&T>) + Send>>>,
    on_cleanup: Option<CleanupFn>,
    lifecycle: Mutex<CallLifecycle>,
}

impl<T: Send + 'static> Call<T> {
    pub(crate) fn new(
        shared: Arc<OperationShared>,
        call_id: CallId,
        opts: CallOptions<T>,
    ) -> Self {
        Self {
            shared,
            call_id,
            fail_on_crash: opts.fail_on_crash,
            on_completion: Mutex::new(opts.on_completion),
            on_cleanup: opts.on_cleanup,
            lifecycle: Mutex::new(CallLifecycle::Open),
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Close the bracket successfully: run `on_completion`, remove the
    /// frame under the lock.
    pub async fn end(&self, result: Option<T>) -> Result<(), EngineError> {
        self.begin_close()?;

        if let Some(on_completion) = self.on_completion.lock().take() {
            on_completion(result.as_ref());
        }

        let removed = self.remove_frame().await;
        self.finish_close(CallLifecycle::Completed, removed)
    }

    /// Close the bracket as failed: record the error, run `on_cleanup`,
    /// remove the frame, and abort the operation when `fail_on_crash`.
    pub async fn fail(
        &self,
        error: &str,
        stack_trace: Option<&str>,
    ) -> Result<(), EngineError> {
        self.begin_close()?;

        let shared = Arc::clone(&self.shared);
        let record = match stack_trace {
            Some(trace) => format!("call {} failed: {error}\n{trace}", self.call_id),
            None => format!("call {} failed: {error}", self.call_id),
        };
        let now = SystemClock.now_utc();
        let log_result = tokio::task::spawn_blocking(move || {
            shared.store.append_log(&shared.operation_id, "error", &record, now)
        })
        .await;
        if let Ok(Err(e)) = log_result {
            debug!(call = %self.call_id, error = %e, "failed to record call failure");
        }

        if let Some(cleanup) = &self.on_cleanup {
            cleanup();
        }

        let removed = self.remove_frame_with_abort(self.fail_on_crash).await;
        self.finish_close(CallLifecycle::Failed, removed)
    }

    fn begin_close(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            CallLifecycle::Open => {
                *lifecycle = CallLifecycle::Closing;
                Ok(())
            }
            state => Err(EngineError::state(format!(
                "call {} already closed ({state:?})",
                self.call_id
            ))),
        }
    }

    fn finish_close(
        &self,
        terminal: CallLifecycle,
        removed: Result<bool, EngineError>,
    ) -> Result<(), EngineError> {
        self.shared.open_calls.lock().remove(&self.call_id);
        match removed {
            Ok(found) => {
                *self.lifecycle.lock() = terminal;
                if found {
                    Ok(())
                } else {
                    // Cleanup beat us to the frame; the bracket is
                    // closed but the caller should know it was lost.
                    Err(EngineError::CallNotFound(self.call_id.clone()))
                }
            }
            Err(e) => {
                *self.lifecycle.lock() = CallLifecycle::Open;
                Err(e)
            }
        }
    }

    async fn remove_frame(&self) -> Result<bool, EngineError> {
        self.remove_frame_with_abort(false).await
    }

    async fn remove_frame_with_abort(&self, set_aborted: bool) -> Result<bool, EngineError> {
        let shared = Arc::clone(&self.shared);
        let call_id = self.call_id.clone();
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                let found = doc.remove_frame(&call_id).is_some();
                if set_aborted {
                    doc.aborted = true;
                }
                Ok(found)
            })
        })
        .await
        .map_err(join_err)?
        .map_err(EngineError::from)
    }
}

impl<T> std::fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("call_id", &self.call_id)
            .field("lifecycle", &*self.lifecycle.lock())
            .finish()
    }
}
