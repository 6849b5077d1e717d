// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dpl_core::LedgerConfig;
use dpl_server::{router, AppState};
use dpl_wire::{CreateOperationRequest, HeartbeatRequest, StartCallRequest, StateRequest};
use std::sync::Arc;
use tempfile::TempDir;

/// Serve a real server on an ephemeral local port.
async fn spawn_server(dir: &TempDir) -> u16 {
    let state = Arc::new(AppState::new("dpld-test", LedgerConfig::for_tests(dir.path())));
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

fn create_req(participant: &str) -> CreateOperationRequest {
    CreateOperationRequest {
        participant_id: participant.into(),
        description: None,
        participant_pid: None,
        operation_id: None,
    }
}

#[tokio::test]
async fn health_round_trips() {
    let dir = TempDir::new().unwrap();
    let port = spawn_server(&dir).await;
    let client = RemoteLedger::new("127.0.0.1", port).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.participant_id, "dpld-test");
}

#[tokio::test]
async fn create_heartbeat_call_complete_through_client() {
    let dir = TempDir::new().unwrap();
    let port = spawn_server(&dir).await;
    let client = RemoteLedger::new("127.0.0.1", port).unwrap();

    let created = client.create_operation(&create_req("remote-alice")).await.unwrap();
    assert!(created.operation_id.as_str().starts_with("op_"));

    let started = client
        .start_call(&StartCallRequest {
            operation_id: created.operation_id.clone(),
            session_id: created.session_id,
            description: Some("remote call".into()),
            fail_on_crash: true,
            supervisor_id: None,
            supervisor_handle: None,
        })
        .await
        .unwrap();

    let hb = client
        .heartbeat(&HeartbeatRequest { operation_id: created.operation_id.clone() })
        .await
        .unwrap();
    assert_eq!(hb.operation_state, "running");
    assert!(hb.participant_ages_ms.contains_key("remote-alice"));

    let state = client
        .state(&StateRequest { operation_id: created.operation_id.clone() })
        .await
        .unwrap();
    assert_eq!(state.document.call_frames.len(), 1);
    assert_eq!(state.document.call_frames[0].call_id, started.call_id);

    client
        .end_call(&dpl_wire::EndCallRequest {
            operation_id: created.operation_id.clone(),
            call_id: started.call_id,
            result: Some(serde_json::json!(42)),
        })
        .await
        .unwrap();
    client
        .complete_operation(&dpl_wire::CompleteRequest {
            operation_id: created.operation_id.clone(),
        })
        .await
        .unwrap();

    // Terminal: state now reports the ledger file gone
    let err = client
        .state(&StateRequest { operation_id: created.operation_id })
        .await
        .unwrap_err();
    match err {
        ClientError::Api(api) => {
            assert_eq!(api.kind, dpl_core::ErrorKind::LedgerNotFound)
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn api_errors_carry_typed_kind() {
    let dir = TempDir::new().unwrap();
    let port = spawn_server(&dir).await;
    let client = RemoteLedger::new("127.0.0.1", port).unwrap();

    let err = client
        .state(&StateRequest { operation_id: "op_missing".into() })
        .await
        .unwrap_err();
    match err {
        ClientError::Api(api) => {
            assert_eq!(api.kind, dpl_core::ErrorKind::LedgerNotFound);
            assert_eq!(api.http_status(), 404);
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // Port 1 on localhost is never listening
    let client =
        RemoteLedger::with_timeout("127.0.0.1", 1, std::time::Duration::from_millis(200))
            .unwrap();
    let err = client.create_operation(&create_req("x")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
