// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-process ledger: operation registry and global staleness sweep.

use crate::error::{join_err, EngineError};
use crate::heartbeat;
use crate::hooks::JoinOptions;
use crate::operation::{OperationShared, Session, UnregisterFn};
use crate::signal;
use dpl_core::{
    Clock, LedgerConfig, OperationDoc, OperationId, OperationState, ParticipantId, SystemClock,
};
use dpl_store::LedgerStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Options for [`Ledger::create_operation`].
#[derive(Debug, Default, Clone)]
pub struct CreateOptions {
    /// Caller-supplied id; generated (`op_<ts>_<rand>`) when absent.
    pub operation_id: Option<OperationId>,
    pub description: Option<String>,
}

struct LedgerInner {
    participant_id: ParticipantId,
    config: LedgerConfig,
    store: Arc<LedgerStore>,
    operations: Mutex<HashMap<OperationId, Arc<OperationShared>>>,
    global_cancel: CancellationToken,
}

/// One participant's handle onto the shared ledger directory.
///
/// Holds the per-process registry of joined operations and runs a slow
/// read-only sweep over every operation under the base path, flagging
/// ledger-wide staleness without mutating foreign documents.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Ledger {
    /// Create a ledger for `participant_id`.
    ///
    /// Validates the configuration, installs the process signal-cleanup
    /// handlers and starts the global heartbeat. Must be called inside a
    /// tokio runtime.
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        config: LedgerConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(|e| EngineError::state(e.to_string()))?;
        let store = Arc::new(LedgerStore::from_config(&config));
        let inner = Arc::new(LedgerInner {
            participant_id: participant_id.into(),
            config,
            store,
            operations: Mutex::new(HashMap::new()),
            global_cancel: CancellationToken::new(),
        });

        signal::install_signal_handlers();
        tokio::spawn(global_sweep(Arc::clone(&inner)));

        info!(participant = %inner.participant_id, base = %inner.config.base_path.display(), "ledger ready");
        Ok(Self { inner })
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.inner.participant_id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<LedgerStore> {
        Arc::clone(&self.inner.store)
    }

    /// Create a new operation and return the initiator's first session.
    pub async fn create_operation(
        &self,
        opts: CreateOptions,
        join: JoinOptions,
    ) -> Result<Session, EngineError> {
        let clock = SystemClock;
        let now = clock.now_utc();
        let operation_id =
            opts.operation_id.unwrap_or_else(|| OperationId::generate(clock.epoch_ms()));

        let mut doc =
            OperationDoc::new(operation_id.clone(), self.inner.participant_id.clone(), now);
        doc.description = opts.description;

        let store = Arc::clone(&self.inner.store);
        let holder = self.inner.participant_id.as_str().to_string();
        let create_doc = doc.clone();
        tokio::task::spawn_blocking(move || store.create(&create_doc, &holder))
            .await
            .map_err(join_err)??;

        debug!(operation = %operation_id, "operation created");
        Ok(self.register(operation_id, true, join))
    }

    /// Join an existing operation by id.
    pub async fn join_operation(
        &self,
        operation_id: &OperationId,
        join: JoinOptions,
    ) -> Result<Session, EngineError> {
        // Same process already holds a handle: just add a session.
        if let Some(shared) = self.inner.operations.lock().get(operation_id) {
            return Ok(Session::new(Arc::clone(shared), self.unregister_fn()));
        }

        let store = Arc::clone(&self.inner.store);
        let holder = self.inner.participant_id.as_str().to_string();
        let id = operation_id.clone();
        let doc = tokio::task::spawn_blocking(move || store.read(&id, &holder))
            .await
            .map_err(join_err)?
            .map_err(|e| match e {
                dpl_store::StoreError::NotFound(id) => EngineError::OperationNotFound(id),
                other => other.into(),
            })?;

        let is_initiator = doc.initiator_id == self.inner.participant_id;
        Ok(self.register(operation_id.clone(), is_initiator, join))
    }

    /// Operations this process currently holds handles for.
    pub fn operation_ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.inner.operations.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every live operation under the base path.
    pub async fn list_operations(&self) -> Result<Vec<OperationId>, EngineError> {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || store.list())
            .await
            .map_err(join_err)?
            .map_err(EngineError::from)
    }

    /// Stop every heartbeat and the global sweep. Sessions become
    /// unusable; documents are left as they are.
    pub async fn shutdown(&self) {
        self.inner.global_cancel.cancel();
        let handles: Vec<Arc<OperationShared>> =
            self.inner.operations.lock().drain().map(|(_, v)| v).collect();
        for shared in handles {
            shared.stop_heartbeat();
        }
        info!(participant = %self.inner.participant_id, "ledger shut down");
    }

    fn register(
        &self,
        operation_id: OperationId,
        is_initiator: bool,
        join: JoinOptions,
    ) -> Session {
        let mut operations = self.inner.operations.lock();
        let shared = operations.entry(operation_id.clone()).or_insert_with(|| {
            let shared = OperationShared::new(
                operation_id.clone(),
                self.inner.participant_id.clone(),
                join.participant_pid.unwrap_or_else(std::process::id),
                is_initiator,
                Arc::clone(&self.inner.store),
                self.inner.config.clone(),
                join.heartbeat.clone(),
                join.on_cleanup.clone(),
                join.role.clone(),
            );
            *shared.hb_task.lock() = Some(heartbeat::spawn_heartbeat(Arc::clone(&shared)));
            shared
        });
        Session::new(Arc::clone(shared), self.unregister_fn())
    }

    fn unregister_fn(&self) -> UnregisterFn {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |operation_id: &OperationId| {
            if let Some(inner) = inner.upgrade() {
                inner.operations.lock().remove(operation_id);
            }
        })
    }
}

/// The ledger-wide heartbeat: a read-only staleness sweep across every
/// operation under the base path, at a slower cadence than the
/// per-operation tasks.
async fn global_sweep(inner: Arc<LedgerInner>) {
    loop {
        tokio::select! {
            _ = inner.global_cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.global_heartbeat_interval) => {}
        }

        let store = Arc::clone(&inner.store);
        let ids = match tokio::task::spawn_blocking(move || store.list()).await {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(error = %e, "global sweep failed to list operations");
                continue;
            }
            Err(_) => continue,
        };

        let now = SystemClock.now_utc();
        for id in ids {
            let store = Arc::clone(&inner.store);
            let peek_id = id.clone();
            let doc = match tokio::task::spawn_blocking(move || store.peek(&peek_id)).await {
                Ok(Ok(doc)) => doc,
                _ => continue,
            };
            if doc.operation_state != OperationState::Running {
                continue;
            }
            for (participant, age) in doc.participant_ages(now) {
                if age > inner.config.stale_threshold {
                    warn!(
                        operation = %id,
                        participant = %participant,
                        age_ms = age.as_millis() as u64,
                        "stale participant observed in ledger sweep"
                    );
                }
            }
        }
    }
    debug!("global sweep stopped");
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;

