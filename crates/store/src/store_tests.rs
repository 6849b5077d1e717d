// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Duration as ChronoDuration;
use dpl_core::test_support::{ts, DocBuilder};
use dpl_core::{CallId, Frame, OperationState, ParticipantId};
use tempfile::TempDir;

fn store(dir: &TempDir) -> LedgerStore {
    let cfg = LedgerConfig::for_tests(dir.path());
    LedgerStore::from_config(&cfg)
}

fn new_doc(id: &str) -> OperationDoc {
    DocBuilder::new(id, "init", ts(1_000)).build()
}

#[test]
fn create_then_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let doc = new_doc("op1");

    store.create(&doc, "init").unwrap();
    let loaded = store.read(&doc.operation_id, "init").unwrap();
    assert_eq!(loaded, doc);
    // Lock is gone after the transaction
    assert!(!store.lock_path(&doc.operation_id).exists());
}

#[test]
fn create_rejects_existing_operation() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let doc = new_doc("op1");
    store.create(&doc, "init").unwrap();
    let err = store.create(&doc, "init").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[test]
fn read_missing_operation_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let err = store.read(&OperationId::new("ghost"), "p").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(err.kind(), dpl_core::ErrorKind::LedgerNotFound);
}

#[test]
fn update_mutates_and_appends_trail() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let doc = new_doc("op1");
    let id = doc.operation_id.clone();
    store.create(&doc, "init").unwrap();

    let now = ts(2_500);
    store
        .update(&id, "init", now, |doc| {
            doc.push_frame(Frame::new(
                ParticipantId::new("init"),
                CallId::new("c1"),
                1,
                now,
            ))?;
            Ok(())
        })
        .unwrap();

    let loaded = store.read(&id, "init").unwrap();
    assert_eq!(loaded.call_frames.len(), 1);

    // create + update = two snapshots
    let trails: Vec<_> = fs::read_dir(store.trails_dir(&id))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(trails.len(), 2);
    assert!(trails.contains(&"000001.500.json".to_string()));
}

#[test]
fn failed_mutation_leaves_document_untouched() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let doc = new_doc("op1");
    let id = doc.operation_id.clone();
    store.create(&doc, "init").unwrap();

    let result: Result<(), _> = store.update(&id, "init", ts(2_000), |doc| {
        doc.set_state(OperationState::Failed)?; // running -> failed is illegal
        Ok(())
    });
    assert!(result.is_err());

    let loaded = store.read(&id, "init").unwrap();
    assert_eq!(loaded.operation_state, OperationState::Running);
    assert!(!store.lock_path(&id).exists());
}

#[test]
fn remove_with_backups_archives_document() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let doc = new_doc("op1");
    let id = doc.operation_id.clone();
    store.create(&doc, "init").unwrap();

    store.remove(&id, "init").unwrap();
    assert!(!store.doc_path(&id).exists());
    assert!(store.backups_dir(&id).join("operation.json").exists());
}

#[test]
fn remove_without_backups_deletes_document() {
    let dir = TempDir::new().unwrap();
    let cfg = LedgerConfig::for_tests(dir.path()).with_backups_enabled(false);
    let store = LedgerStore::from_config(&cfg);
    let doc = new_doc("op1");
    let id = doc.operation_id.clone();
    store.create(&doc, "init").unwrap();

    store.remove(&id, "init").unwrap();
    assert!(!store.doc_path(&id).exists());
    assert!(!store.backups_dir(&id).join("operation.json").exists());
}

#[test]
fn list_returns_live_operations_sorted() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(&new_doc("op_b"), "init").unwrap();
    store.create(&new_doc("op_a"), "init").unwrap();

    let ids = store.list().unwrap();
    assert_eq!(ids, vec![OperationId::new("op_a"), OperationId::new("op_b")]);
}

#[test]
fn list_on_missing_base_dir_is_empty() {
    let dir = TempDir::new().unwrap();
    let cfg = LedgerConfig::for_tests(dir.path().join("nested/never-created"));
    let store = LedgerStore::from_config(&cfg);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn trail_is_bounded_by_max_backups() {
    let dir = TempDir::new().unwrap();
    let mut cfg = LedgerConfig::for_tests(dir.path());
    cfg.max_backups = 3;
    let store = LedgerStore::from_config(&cfg);
    let doc = new_doc("op1");
    let id = doc.operation_id.clone();
    store.create(&doc, "init").unwrap();

    for i in 0..6 {
        let now = ts(2_000) + ChronoDuration::milliseconds(i * 100);
        store
            .update(&id, "init", now, |doc| {
                doc.touch_heartbeat(&ParticipantId::new("init"), now);
                Ok(())
            })
            .unwrap();
    }

    let count = fs::read_dir(store.trails_dir(&id)).unwrap().count();
    assert_eq!(count, 3);
}

#[test]
fn append_log_writes_stamped_lines() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let id = OperationId::new("op1");

    store.append_log(&id, "info", "starting work", ts(1_722_500_000_123)).unwrap();
    store.append_log(&id, "warn", "something odd", ts(1_722_500_001_000)).unwrap();

    let content = fs::read_to_string(store.log_path(&id)).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "2024-08-01T08:13:20.123Z [info] starting work");
    assert!(lines[1].contains("[warn] something odd"));
}

#[test]
fn concurrent_updates_serialize_through_the_lock() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(store(&dir));
    let doc = new_doc("op1");
    let id = doc.operation_id.clone();
    store.create(&doc, "init").unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let store = std::sync::Arc::clone(&store);
        let id = id.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..5 {
                let now = ts(10_000 + (t * 5 + i) * 37);
                store
                    .update(&id, &format!("writer-{t}"), now, |doc| {
                        doc.push_frame(Frame::new(
                            ParticipantId::new(format!("writer-{t}")),
                            CallId::new(format!("c-{t}-{i}")),
                            1,
                            now,
                        ))?;
                        Ok(())
                    })
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // No frame lost: every writer's append survived
    let loaded = store.read(&id, "check").unwrap();
    assert_eq!(loaded.call_frames.len(), 20);
}
