// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy path: one call, a clean complete, everything archived.

use crate::prelude::*;
use dpl_core::OperationId;

#[tokio::test]
async fn single_call_and_complete_archives_cleanly() {
    let dir = tempfile::TempDir::new().unwrap();
    let ledger = quiet_participant(&dir, "a");

    let session = ledger
        .create_operation(
            CreateOptions {
                operation_id: Some(OperationId::new("op1")),
                description: Some("happy path".into()),
            },
            JoinOptions::default(),
        )
        .await
        .unwrap();

    let call = session.start_call::<i64>(CallOptions::described("answer")).await.unwrap();
    call.end(Some(42)).await.unwrap();

    session.complete().await.unwrap();

    let store = ledger.store();
    let id = OperationId::new("op1");

    // Live file and lock are gone; the backup folder exists
    assert!(!store.doc_path(&id).exists());
    assert!(!store.lock_path(&id).exists());
    let backup = store.backups_dir(&id).join("operation.json");
    assert!(backup.exists());

    // The archived snapshot is the terminal document
    let doc: dpl_core::OperationDoc =
        serde_json::from_str(&std::fs::read_to_string(&backup).unwrap()).unwrap();
    assert_eq!(doc.operation_state, OperationState::Completed);
    assert!(doc.call_frames.is_empty());

    // A trail snapshot rode along into the backup folder
    let archived: Vec<_> = std::fs::read_dir(store.backups_dir(&id))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert!(archived.iter().any(|name| name != "operation.json" && name.ends_with(".json")));

    // The heartbeat is stopped: no handle remains in the registry
    assert!(ledger.operation_ids().is_empty());
}
