// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote access: the HTTP server mediates the same ledger directory
//! that local participants use directly.

use crate::prelude::*;
use dpl_client::RemoteLedger;
use dpl_core::LedgerConfig;
use dpl_server::{router, AppState};
use dpl_wire::{
    CompleteRequest, CreateOperationRequest, EndCallRequest, LogRequest, StartCallRequest,
    StateRequest,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn spawn_server(dir: &TempDir) -> u16 {
    let state = Arc::new(AppState::new("dpld-spec", LedgerConfig::for_tests(dir.path())));
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

#[tokio::test]
async fn remote_and_local_participants_share_one_operation() {
    let dir = TempDir::new().unwrap();
    let port = spawn_server(&dir).await;
    let client = RemoteLedger::new("127.0.0.1", port).unwrap();

    // Remote participant creates the operation and opens a call
    let created = client
        .create_operation(&CreateOperationRequest {
            participant_id: "remote-a".into(),
            description: Some("mixed deployment".into()),
            participant_pid: Some(4242),
            operation_id: None,
        })
        .await
        .unwrap();
    let started = client
        .start_call(&StartCallRequest {
            operation_id: created.operation_id.clone(),
            session_id: created.session_id,
            description: Some("remote work".into()),
            fail_on_crash: true,
            supervisor_id: None,
            supervisor_handle: None,
        })
        .await
        .unwrap();

    // A local participant joins the same directory directly
    let local = participant(&dir, "local-b");
    let local_session =
        local.join_operation(&created.operation_id, JoinOptions::default()).await.unwrap();
    let doc = local_session.state().await.unwrap();
    assert_eq!(doc.initiator_id, "remote-a");
    assert_eq!(doc.call_frames.len(), 1);
    assert_eq!(doc.call_frames[0].pid, 4242);

    // The remote view includes the local participant's heartbeat soon
    client
        .append_log(&LogRequest {
            operation_id: created.operation_id.clone(),
            message: "local participant joined".into(),
            level: None,
        })
        .await
        .unwrap();
    let state = client
        .state(&StateRequest { operation_id: created.operation_id.clone() })
        .await
        .unwrap();
    assert_eq!(state.document.operation_id, created.operation_id);

    // Remote side finishes the call and completes the operation
    client
        .end_call(&EndCallRequest {
            operation_id: created.operation_id.clone(),
            call_id: started.call_id,
            result: Some(serde_json::json!({"value": 42})),
        })
        .await
        .unwrap();
    local_session.leave(false).await.unwrap();
    client
        .complete_operation(&CompleteRequest { operation_id: created.operation_id.clone() })
        .await
        .unwrap();

    // Archived on disk where both sides can see it
    let store = local.store();
    assert!(!store.exists(&created.operation_id));
    assert!(store.backups_dir(&created.operation_id).join("operation.json").exists());
    let log =
        std::fs::read_to_string(store.log_path(&created.operation_id)).unwrap();
    assert!(log.contains("local participant joined"));

    local.shutdown().await;
}
