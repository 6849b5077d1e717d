// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side bookkeeping: ledgers per participant, sessions, calls.

use dpl_core::{CallId, LedgerConfig, OperationId, SessionId};
use dpl_engine::{Call, EngineError, JoinOptions, Ledger, Session};
use dpl_store::LedgerStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Result value type for server-mediated calls: callbacks live on the
/// client, so the server only shuttles opaque JSON.
pub type RemoteCall = Call<serde_json::Value>;

pub struct AppState {
    config: LedgerConfig,
    store: Arc<LedgerStore>,
    /// One local ledger per remote participant id.
    ledgers: Mutex<HashMap<String, Ledger>>,
    /// Sessions by operation, ordered by session id.
    sessions: Mutex<HashMap<OperationId, BTreeMap<SessionId, Arc<Session>>>>,
    /// Open server-mediated calls.
    calls: Mutex<HashMap<CallId, Arc<RemoteCall>>>,
    participant_id: String,
}

impl AppState {
    pub fn new(participant_id: impl Into<String>, config: LedgerConfig) -> Self {
        let store = Arc::new(LedgerStore::from_config(&config));
        Self {
            config,
            store,
            ledgers: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            participant_id: participant_id.into(),
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn store(&self) -> Arc<LedgerStore> {
        Arc::clone(&self.store)
    }

    pub fn operation_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// The local ledger acting for `participant`, created on first use.
    pub fn ledger_for(&self, participant: &str) -> Result<Ledger, EngineError> {
        let mut ledgers = self.ledgers.lock();
        if let Some(ledger) = ledgers.get(participant) {
            return Ok(ledger.clone());
        }
        let ledger = Ledger::new(participant, self.config.clone())?;
        ledgers.insert(participant.to_string(), ledger.clone());
        Ok(ledger)
    }

    pub fn track_session(&self, session: Session) -> (SessionId, Arc<Session>) {
        let id = session.session_id();
        let session = Arc::new(session);
        self.sessions
            .lock()
            .entry(session.operation_id().clone())
            .or_default()
            .insert(id, Arc::clone(&session));
        (id, session)
    }

    /// Look up a tracked session; the oldest one when `session_id` is
    /// absent.
    pub fn session_for(
        &self,
        operation_id: &OperationId,
        session_id: Option<SessionId>,
    ) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock();
        let by_id = sessions.get(operation_id)?;
        match session_id {
            Some(id) => by_id.get(&id).cloned(),
            None => by_id.values().next().cloned(),
        }
    }

    /// Remove one session; drops the operation entry when it was the
    /// last one.
    pub fn drop_session(&self, operation_id: &OperationId, session_id: SessionId) {
        let mut sessions = self.sessions.lock();
        if let Some(by_id) = sessions.get_mut(operation_id) {
            by_id.remove(&session_id);
            if by_id.is_empty() {
                sessions.remove(operation_id);
            }
        }
    }

    /// Remove every session and call handle for an operation (complete,
    /// failure observed remotely).
    pub fn drop_operation(&self, operation_id: &OperationId) {
        self.sessions.lock().remove(operation_id);
    }

    pub fn track_call(&self, call: RemoteCall) -> Arc<RemoteCall> {
        let call = Arc::new(call);
        self.calls.lock().insert(call.call_id().clone(), Arc::clone(&call));
        call
    }

    pub fn take_call(&self, call_id: &CallId) -> Option<Arc<RemoteCall>> {
        self.calls.lock().remove(call_id)
    }
}
