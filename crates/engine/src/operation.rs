// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process operation handles and sessions.
//!
//! One [`OperationShared`] exists per operation per process, shared by
//! every session that joined it. Sessions are cheap, in-process handles;
//! their ids never reach the document. The handle owns the heartbeat
//! task, the abort/failure watches and the registry of calls this
//! process has open.

use crate::call::{Call, CallOptions};
use crate::coordinator::{self, OperationFailedInfo};
use crate::error::{join_err, EngineError};
use crate::heartbeat::{self, HeartbeatError, HeartbeatResult};
use crate::hooks::{CleanupFn, HeartbeatHooks, ParticipantRole};
use crate::signal;
use crate::spawned::{SpawnContext, SpawnOptions, SpawnedCall};
use dpl_core::{
    CallId, Clock, Frame, LedgerConfig, OperationDoc, OperationId, OperationState, ParticipantId,
    SessionId, SystemClock,
};
use dpl_store::LedgerStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A call this process currently has open.
pub(crate) struct CallRegistration {
    /// Present for spawned calls; cancelled on `leave(cancel_pending)`.
    pub cancel: Option<CancellationToken>,
}

/// Shared per-operation state for one participant process.
pub(crate) struct OperationShared {
    pub operation_id: OperationId,
    pub participant_id: ParticipantId,
    pub pid: u32,
    pub is_initiator: bool,
    pub store: Arc<LedgerStore>,
    pub config: LedgerConfig,
    pub hooks: HeartbeatHooks,
    pub on_cleanup: Option<CleanupFn>,
    pub role: ParticipantRole,

    pub join_count: Mutex<u32>,
    pub open_calls: Mutex<HashMap<CallId, CallRegistration>>,

    /// Resolves (once) when the abort flag is observed set.
    pub abort_tx: watch::Sender<bool>,
    /// Last operation state this process observed.
    pub state_tx: watch::Sender<OperationState>,
    /// Resolves (once) when the operation fails.
    pub failure_tx: watch::Sender<Option<OperationFailedInfo>>,

    /// This heartbeat detected the crash (or inherited coordination).
    pub coordinator: AtomicBool,
    /// Local cleanup already ran in this process.
    pub self_cleaned: AtomicBool,
    /// Supervisor drain passes performed so far.
    pub supervisor_passes: AtomicU64,
    pub abort_observed: AtomicBool,
    /// Terminal for this process: completed, failed+deleted, or left.
    pub terminated: AtomicBool,

    pub hb_cancel: CancellationToken,
    pub hb_task: Mutex<Option<JoinHandle<()>>>,
    pub tick_seq: AtomicU64,
}

impl OperationShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operation_id: OperationId,
        participant_id: ParticipantId,
        pid: u32,
        is_initiator: bool,
        store: Arc<LedgerStore>,
        config: LedgerConfig,
        hooks: HeartbeatHooks,
        on_cleanup: Option<CleanupFn>,
        role: ParticipantRole,
    ) -> Arc<Self> {
        Arc::new(Self {
            operation_id,
            participant_id,
            pid,
            is_initiator,
            store,
            config,
            hooks,
            on_cleanup,
            role,
            join_count: Mutex::new(0),
            open_calls: Mutex::new(HashMap::new()),
            abort_tx: watch::Sender::new(false),
            state_tx: watch::Sender::new(OperationState::Running),
            failure_tx: watch::Sender::new(None),
            coordinator: AtomicBool::new(false),
            self_cleaned: AtomicBool::new(false),
            supervisor_passes: AtomicU64::new(0),
            abort_observed: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            hb_cancel: CancellationToken::new(),
            hb_task: Mutex::new(None),
            tick_seq: AtomicU64::new(0),
        })
    }

    pub fn holder(&self) -> &str {
        self.participant_id.as_str()
    }

    pub fn stop_heartbeat(&self) {
        self.hb_cancel.cancel();
    }

    pub fn new_session_id(&self) -> SessionId {
        // Process-wide counter: session ids stay unique across every
        // operation and participant handle in this process.
        static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    fn check_live(&self) -> Result<(), EngineError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(EngineError::state(format!(
                "operation {} is no longer joined by this process",
                self.operation_id
            )));
        }
        Ok(())
    }
}

/// Callback invoked when the registry should drop a finished handle.
pub(crate) type UnregisterFn = Arc<dyn Fn(&OperationId) + Send + Sync>;

/// One joined handle onto an operation.
///
/// Returned by `create_operation`/`join_operation`; multiple sessions per
/// participant are allowed and share the process-wide handle. Dropping a
/// session without calling [`leave`](Session::leave) keeps the join
/// counted (and the heartbeat alive) until the ledger shuts down.
pub struct Session {
    pub(crate) shared: Arc<OperationShared>,
    pub(crate) session_id: SessionId,
    pub(crate) my_calls: Mutex<Vec<CallId>>,
    pub(crate) left: AtomicBool,
    pub(crate) unregister: UnregisterFn,
}

impl Session {
    pub(crate) fn new(shared: Arc<OperationShared>, unregister: UnregisterFn) -> Self {
        let session_id = shared.new_session_id();
        *shared.join_count.lock() += 1;
        Self {
            shared,
            session_id,
            my_calls: Mutex::new(Vec::new()),
            left: AtomicBool::new(false),
            unregister,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.shared.operation_id
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.shared.participant_id
    }

    pub fn is_initiator(&self) -> bool {
        self.shared.is_initiator
    }

    /// Current document state, read under the lock.
    pub async fn state(&self) -> Result<OperationDoc, EngineError> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            shared.store.read(&shared.operation_id, shared.holder())
        })
        .await
        .map_err(join_err)?
        .map_err(EngineError::from)
    }

    /// Open a synchronous call bracket. Appends a frame under the lock.
    pub async fn start_call<T: Send + 'static>(
        &self,
        opts: CallOptions<T>,
    ) -> Result<Call<T>, EngineError> {
        self.ensure_joined()?;
        let call_id = CallId::generate();
        self.append_frame(&call_id, &opts.description, opts.fail_on_crash, &opts.resources,
            opts.supervisor_id.clone(), opts.supervisor_handle.clone())
            .await?;
        self.shared
            .open_calls
            .lock()
            .insert(call_id.clone(), CallRegistration { cancel: None });
        self.my_calls.lock().push(call_id.clone());
        debug!(operation = %self.shared.operation_id, call = %call_id, "call started");
        Ok(Call::new(Arc::clone(&self.shared), call_id, opts))
    }

    /// Spawn an asynchronous call. The frame is appended before the work
    /// is scheduled, so the call id is available at once.
    pub async fn spawn_call<T, F, Fut>(
        &self,
        opts: SpawnOptions,
        work: F,
    ) -> Result<SpawnedCall<T>, EngineError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(SpawnContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        self.ensure_joined()?;
        let call_id = CallId::generate();
        self.append_frame(&call_id, &opts.description, opts.fail_on_crash, &[], None, None)
            .await?;

        // Register before the work is scheduled so a fast finish still
        // finds (and clears) its own entry.
        let cancel = CancellationToken::new();
        self.shared
            .open_calls
            .lock()
            .insert(call_id.clone(), CallRegistration { cancel: Some(cancel.clone()) });
        self.my_calls.lock().push(call_id.clone());

        let call =
            SpawnedCall::spawn(Arc::clone(&self.shared), call_id.clone(), opts, cancel, work);
        debug!(operation = %self.shared.operation_id, call = %call_id, "call spawned");
        Ok(call)
    }

    /// Leave the operation. The last session to leave stops the
    /// heartbeat and drops the per-process handle.
    ///
    /// Open calls started by this session block the leave unless
    /// `cancel_pending_calls` is set, in which case they are cancelled
    /// and their frames removed.
    pub async fn leave(&self, cancel_pending_calls: bool) -> Result<(), EngineError> {
        if self.left.swap(true, Ordering::AcqRel) {
            return Err(EngineError::state("session already left"));
        }

        // Lock order: open_calls before my_calls, matching open_calls()
        let mine: Vec<CallId> = std::mem::take(&mut *self.my_calls.lock());
        let my_calls: Vec<CallId> = {
            let open = self.shared.open_calls.lock();
            mine.iter().filter(|c| open.contains_key(*c)).cloned().collect()
        };

        if !my_calls.is_empty() {
            if !cancel_pending_calls {
                self.left.store(false, Ordering::Release);
                *self.my_calls.lock() = mine;
                return Err(EngineError::state(format!(
                    "session has {} pending call(s); pass cancel_pending_calls to leave anyway",
                    my_calls.len()
                )));
            }
            // Cooperative cancellation first, then drop the frames.
            {
                let mut open = self.shared.open_calls.lock();
                for id in &my_calls {
                    if let Some(reg) = open.remove(id) {
                        if let Some(token) = reg.cancel {
                            token.cancel();
                        }
                    }
                }
            }
            let shared = Arc::clone(&self.shared);
            let ids = my_calls.clone();
            let clock = SystemClock;
            let now = clock.now_utc();
            let result = tokio::task::spawn_blocking(move || {
                shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                    for id in &ids {
                        doc.remove_frame(id);
                    }
                    Ok(())
                })
            })
            .await
            .map_err(join_err)?;
            match result {
                Ok(()) => {}
                // The document can already be gone in terminal states
                Err(dpl_store::StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let remaining = {
            let mut count = self.shared.join_count.lock();
            *count = count.saturating_sub(1);
            *count
        };
        if remaining == 0 {
            self.shared.stop_heartbeat();
            self.shared.terminated.store(true, Ordering::Release);
            (self.unregister)(&self.shared.operation_id);
            debug!(operation = %self.shared.operation_id, "last session left, heartbeat stopped");
        }
        Ok(())
    }

    /// Terminate the operation successfully. Initiator only; fails with
    /// a state conflict while other participants still hold frames.
    pub async fn complete(&self) -> Result<(), EngineError> {
        self.ensure_joined()?;
        let shared = Arc::clone(&self.shared);
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                coordinator::complete_transform(doc, &shared.participant_id)?;
                Ok(())
            })?;
            shared.store.remove(&shared.operation_id, shared.holder())
        })
        .await
        .map_err(join_err)??;

        self.shared.open_calls.lock().clear();
        self.my_calls.lock().clear();
        self.shared.state_tx.send_replace(OperationState::Completed);
        self.shared.stop_heartbeat();
        self.shared.terminated.store(true, Ordering::Release);
        (self.unregister)(&self.shared.operation_id);
        debug!(operation = %self.shared.operation_id, "operation completed");
        Ok(())
    }

    /// Set (or clear) the cooperative abort flag.
    ///
    /// The flag alone triggers no cleanup; each participant observes it
    /// on its next heartbeat and decides what to do.
    pub async fn set_abort_flag(&self, value: bool) -> Result<(), EngineError> {
        self.ensure_joined()?;
        let shared = Arc::clone(&self.shared);
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                doc.aborted = value;
                Ok(())
            })
        })
        .await
        .map_err(join_err)??;
        Ok(())
    }

    /// Append a line to the operation log.
    pub async fn append_log(&self, level: &str, message: &str) -> Result<(), EngineError> {
        let shared = Arc::clone(&self.shared);
        let level = level.to_string();
        let message = message.to_string();
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.append_log(&shared.operation_id, &level, &message, now)
        })
        .await
        .map_err(join_err)??;
        Ok(())
    }

    /// Register a temp path for guaranteed cleanup (document + local
    /// signal registry). Call before creating the file.
    pub async fn register_temp_resource(&self, path: &Path) -> Result<(), EngineError> {
        self.ensure_joined()?;
        let shared = Arc::clone(&self.shared);
        let path_buf = path.to_path_buf();
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                doc.register_temp_resource(&path_buf, shared.pid, now);
                Ok(())
            })
        })
        .await
        .map_err(join_err)??;
        signal::track_temp_path(path);
        Ok(())
    }

    /// Unregister a temp path after the caller deleted the file.
    pub async fn unregister_temp_resource(&self, path: &Path) -> Result<(), EngineError> {
        let shared = Arc::clone(&self.shared);
        let path_buf = path.to_path_buf();
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                doc.unregister_temp_resource(&path_buf);
                Ok(())
            })
        })
        .await
        .map_err(join_err)??;
        signal::untrack_temp_path(path);
        Ok(())
    }

    /// Run one heartbeat immediately (the HTTP surface uses this).
    pub async fn heartbeat_now(&self) -> Result<HeartbeatResult, HeartbeatError> {
        heartbeat::heartbeat_once(&self.shared).await
    }

    /// Resolves when the abort flag is observed set.
    pub async fn aborted(&self) {
        let mut rx = self.shared.abort_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Watch for the abort flag (already-resolved watches stay resolved).
    pub fn abort_watch(&self) -> watch::Receiver<bool> {
        self.shared.abort_tx.subscribe()
    }

    /// Watch the locally-observed operation state.
    pub fn state_watch(&self) -> watch::Receiver<OperationState> {
        self.shared.state_tx.subscribe()
    }

    /// Watch for operation failure (post-mortem info once resolved).
    pub fn failure_watch(&self) -> watch::Receiver<Option<OperationFailedInfo>> {
        self.shared.failure_tx.subscribe()
    }

    /// Call ids opened through this session and still open process-wide.
    pub fn open_calls(&self) -> Vec<CallId> {
        let open = self.shared.open_calls.lock();
        self.my_calls.lock().iter().filter(|c| open.contains_key(*c)).cloned().collect()
    }

    fn ensure_joined(&self) -> Result<(), EngineError> {
        if self.left.load(Ordering::Acquire) {
            return Err(EngineError::state("session already left"));
        }
        self.shared.check_live()
    }

    async fn append_frame(
        &self,
        call_id: &CallId,
        description: &Option<String>,
        fail_on_crash: bool,
        resources: &[PathBuf],
        supervisor_id: Option<String>,
        supervisor_handle: Option<String>,
    ) -> Result<(), EngineError> {
        let shared = Arc::clone(&self.shared);
        let call_id = call_id.clone();
        let description = description.clone();
        let resources = resources.to_vec();
        let now = SystemClock.now_utc();
        tokio::task::spawn_blocking(move || {
            shared.store.update(&shared.operation_id, shared.holder(), now, |doc| {
                if doc.operation_state != OperationState::Running {
                    return Err(dpl_core::DocumentError::NotRunning(doc.operation_state).into());
                }
                let mut frame =
                    Frame::new(shared.participant_id.clone(), call_id, shared.pid, now);
                frame.description = description;
                frame.fail_on_crash = fail_on_crash;
                frame.resources = resources;
                frame.supervisor_id = supervisor_id;
                frame.supervisor_handle = supervisor_handle;
                doc.push_frame(frame)?;
                doc.touch_heartbeat(&shared.participant_id, now);
                Ok(())
            })
        })
        .await
        .map_err(join_err)?
        .map_err(EngineError::from)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("operation_id", &self.shared.operation_id)
            .field("session_id", &self.session_id)
            .finish()
    }
}
