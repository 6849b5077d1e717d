// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic read-modify-write access to operation documents.
//!
//! Every mutation follows `acquire -> read -> mutate -> write+fsync ->
//! trail -> unlock`. Writes go through a temp file and an atomic rename,
//! so readers never observe a torn document even without the lock.

use crate::lock::{LockError, LockGuard, LockOp, LockSettings};
use crate::trail;
use chrono::{DateTime, Utc};
use dpl_core::{DocumentError, LedgerConfig, OperationDoc, OperationId};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const DOC_SUFFIX: &str = ".operation.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("operation not found: {0}")]
    NotFound(OperationId),

    #[error("operation already exists: {0}")]
    AlreadyExists(OperationId),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Classification for callbacks and the wire.
    pub fn kind(&self) -> dpl_core::ErrorKind {
        use dpl_core::ErrorKind;
        match self {
            StoreError::NotFound(_) => ErrorKind::LedgerNotFound,
            StoreError::AlreadyExists(_) => ErrorKind::StateConflict,
            StoreError::Lock(_) => ErrorKind::LockFailed,
            StoreError::Document(_) => ErrorKind::StateConflict,
            StoreError::Json(_) | StoreError::Io(_) => ErrorKind::IoError,
        }
    }
}

/// Store tunables, extracted from [`LedgerConfig`].
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub lock: LockSettings,
    pub max_backups: usize,
    pub backups_enabled: bool,
}

impl From<&LedgerConfig> for StoreSettings {
    fn from(cfg: &LedgerConfig) -> Self {
        Self {
            lock: LockSettings {
                timeout: cfg.lock_timeout,
                retry_interval: cfg.lock_retry_interval,
                stale_limit: cfg.stale_lock_limit,
            },
            max_backups: cfg.max_backups,
            backups_enabled: cfg.backups_enabled,
        }
    }
}

/// Filesystem store for operation documents.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    base_path: PathBuf,
    settings: StoreSettings,
}

impl LedgerStore {
    pub fn new(base_path: impl Into<PathBuf>, settings: StoreSettings) -> Self {
        Self { base_path: base_path.into(), settings }
    }

    pub fn from_config(cfg: &LedgerConfig) -> Self {
        Self::new(cfg.base_path.clone(), StoreSettings::from(cfg))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn doc_path(&self, id: &OperationId) -> PathBuf {
        self.base_path.join(format!("{id}{DOC_SUFFIX}"))
    }

    pub fn lock_path(&self, id: &OperationId) -> PathBuf {
        self.base_path.join(format!("{id}{DOC_SUFFIX}.lock"))
    }

    pub fn trails_dir(&self, id: &OperationId) -> PathBuf {
        self.base_path.join("trails").join(id.as_str())
    }

    pub fn backups_dir(&self, id: &OperationId) -> PathBuf {
        self.base_path.join("backups").join(id.as_str())
    }

    pub fn log_path(&self, id: &OperationId) -> PathBuf {
        self.base_path.join("logs").join(format!("{id}.log"))
    }

    pub fn exists(&self, id: &OperationId) -> bool {
        self.doc_path(id).exists()
    }

    /// Write a brand-new operation document.
    pub fn create(&self, doc: &OperationDoc, holder: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_path)?;
        let id = &doc.operation_id;
        let guard = self.lock(id, holder, LockOp::Write)?;
        if self.exists(id) {
            guard.release()?;
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        let bytes = self.write_doc(id, doc)?;
        trail::append_snapshot(
            &self.trails_dir(id),
            doc.start_time,
            doc.start_time,
            &bytes,
            self.settings.max_backups,
        )?;
        guard.release()?;
        debug!(operation = %id, "operation created");
        Ok(())
    }

    /// Read the document under a shared-intent lock.
    pub fn read(&self, id: &OperationId, holder: &str) -> Result<OperationDoc, StoreError> {
        let guard = self.lock(id, holder, LockOp::Read)?;
        let result = self.read_doc(id);
        guard.release()?;
        result
    }

    /// Lock-free read. Safe against torn writes (writers rename), but may
    /// race a concurrent mutation; use only where best-effort freshness
    /// is acceptable.
    pub fn peek(&self, id: &OperationId) -> Result<OperationDoc, StoreError> {
        self.read_doc(id)
    }

    /// The read-modify-write transaction.
    ///
    /// `mutate` runs with the lock held and must not call back into the
    /// store. A trail snapshot of the written document is appended
    /// before the lock is released; a mutation that leaves the document
    /// bit-identical writes nothing.
    pub fn update<T>(
        &self,
        id: &OperationId,
        holder: &str,
        now: DateTime<Utc>,
        mutate: impl FnOnce(&mut OperationDoc) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.lock(id, holder, LockOp::Write)?;
        let result = (|| {
            let mut doc = self.read_doc(id)?;
            let original = doc.clone();
            let value = mutate(&mut doc)?;
            if doc != original {
                let bytes = self.write_doc(id, &doc)?;
                trail::append_snapshot(
                    &self.trails_dir(id),
                    doc.start_time,
                    now,
                    &bytes,
                    self.settings.max_backups,
                )?;
            }
            Ok(value)
        })();
        guard.release()?;
        result
    }

    /// Remove the live document, archiving it under `backups/` when
    /// backups are enabled.
    pub fn remove(&self, id: &OperationId, holder: &str) -> Result<(), StoreError> {
        let guard = self.lock(id, holder, LockOp::Write)?;
        let result = (|| {
            let doc_path = self.doc_path(id);
            if !doc_path.exists() {
                return Err(StoreError::NotFound(id.clone()));
            }
            if self.settings.backups_enabled {
                trail::backup_operation(&self.backups_dir(id), &doc_path, &self.trails_dir(id))?;
            } else {
                fs::remove_file(&doc_path)?;
            }
            Ok(())
        })();
        guard.release()?;
        debug!(operation = %id, archived = self.settings.backups_enabled, "operation removed");
        result
    }

    /// Ids of every live operation under the base path.
    pub fn list(&self) -> Result<Vec<OperationId>, StoreError> {
        let mut ids = Vec::new();
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(DOC_SUFFIX) {
                    ids.push(OperationId::new(id));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Append one line to the operation log. Append-only, so no lock.
    pub fn append_log(
        &self,
        id: &OperationId,
        level: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let path = self.log_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        let stamp = now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        writeln!(file, "{stamp} [{level}] {message}")?;
        Ok(())
    }

    fn lock(
        &self,
        id: &OperationId,
        holder: &str,
        op: LockOp,
    ) -> Result<LockGuard, LockError> {
        LockGuard::acquire(&self.lock_path(id), holder, op, &self.settings.lock)
    }

    fn read_doc(&self, id: &OperationId) -> Result<OperationDoc, StoreError> {
        let path = self.doc_path(id);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Serialize, write to a temp file, fsync, rename into place.
    /// Returns the bytes for the trail copy.
    fn write_doc(&self, id: &OperationId, doc: &OperationDoc) -> Result<Vec<u8>, StoreError> {
        let path = self.doc_path(id);
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
