// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash detection and the four-phase cleanup, including supervisor
//! draining and coordinator inheritance.

use crate::prelude::*;
use dpl_core::ErrorKind;
use dpl_engine::{ParticipantRole, SupervisorHooks};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn supervised_participant_crash_walks_all_phases() {
    let dir = tempfile::TempDir::new().unwrap();
    let alice = participant(&dir, "a");
    let bob = participant(&dir, "b");

    let errors: Arc<Mutex<Vec<ErrorKind>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let a_session = alice
        .create_operation(
            CreateOptions::default(),
            JoinOptions {
                heartbeat: HeartbeatHooks {
                    on_success: None,
                    on_error: Some(Arc::new(move |err| sink.lock().push(err.kind))),
                },
                ..JoinOptions::default()
            },
        )
        .await
        .unwrap();
    let op_id = a_session.operation_id().clone();

    let b_session = bob.join_operation(&op_id, JoinOptions::default()).await.unwrap();
    let _b_call = b_session
        .start_call::<()>(CallOptions {
            supervisor_id: Some("sup1".into()),
            ..CallOptions::default()
        })
        .await
        .unwrap();

    // Kill bob: heartbeats stop without a leave
    bob.shutdown().await;

    let store = alice.store();

    // Detection: cleanup state, detection timestamp, frame crashed
    // (supervised frames are left for their supervisor)
    assert!(
        wait_for(SPEC_WAIT_MAX, || {
            store
                .peek(&op_id)
                .map(|d| {
                    d.operation_state == OperationState::Cleanup
                        && d.detection_timestamp.is_some()
                })
                .unwrap_or(false)
        })
        .await,
        "alice should detect bob's stale frame"
    );
    assert!(errors.lock().contains(&ErrorKind::HeartbeatStale));

    // Phase 4 ends with the document archived
    assert!(
        wait_for(SPEC_WAIT_MAX, || !store.exists(&op_id)).await,
        "the document should be moved to backups"
    );
    assert!(store.backups_dir(&op_id).join("operation.json").exists());

    // Failure future resolved with the post-mortem
    assert!(a_session.failure_watch().borrow().is_some());

    alice.shutdown().await;
}

#[tokio::test]
async fn supervisor_drains_crashed_frames_and_reports_them() {
    let dir = tempfile::TempDir::new().unwrap();
    let alice = participant(&dir, "a");
    let bob = participant(&dir, "b");
    let supervisor = participant(&dir, "sup-host");

    let a_session = alice
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();
    let op_id = a_session.operation_id().clone();

    let b_session = bob.join_operation(&op_id, JoinOptions::default()).await.unwrap();
    let _b_call = b_session
        .start_call::<()>(CallOptions {
            supervisor_id: Some("sup1".into()),
            supervisor_handle: Some("unit-7".into()),
            ..CallOptions::default()
        })
        .await
        .unwrap();

    let cleanups = Arc::new(AtomicUsize::new(0));
    let crashes = Arc::new(AtomicUsize::new(0));
    let cleanup_counter = Arc::clone(&cleanups);
    let crash_counter = Arc::clone(&crashes);
    let _s_session = supervisor
        .join_operation(
            &op_id,
            JoinOptions {
                role: ParticipantRole::Supervisor {
                    supervisor_id: "sup1".into(),
                    hooks: SupervisorHooks {
                        on_call_cleanup: Arc::new(move |_frame| {
                            cleanup_counter.fetch_add(1, Ordering::SeqCst);
                        }),
                        on_call_crashed: Arc::new(move |_frame| {
                            crash_counter.fetch_add(1, Ordering::SeqCst);
                        }),
                    },
                },
                ..JoinOptions::default()
            },
        )
        .await
        .unwrap();

    bob.shutdown().await;

    // The supervisor's drain runs its hooks (cleanup before crashed)
    assert!(
        wait_for(SPEC_WAIT_MAX, || crashes.load(Ordering::SeqCst) >= 1).await,
        "supervisor should drain bob's crashed frame"
    );
    assert!(cleanups.load(Ordering::SeqCst) >= 1);

    alice.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn surviving_participant_inherits_coordination() {
    // The coordinator (alice) dies right after detection; a later
    // heartbeat from carol must finish phases 3 and 4.
    let dir = tempfile::TempDir::new().unwrap();
    let alice = participant(&dir, "a");
    let bob = participant(&dir, "b");
    let carol = participant(&dir, "c");

    let a_session = alice
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();
    let op_id = a_session.operation_id().clone();

    let b_session = bob.join_operation(&op_id, JoinOptions::default()).await.unwrap();
    let _b_call = b_session.start_call::<()>(CallOptions::described("doomed")).await.unwrap();
    let _c_session = carol.join_operation(&op_id, JoinOptions::default()).await.unwrap();

    bob.shutdown().await;

    let store = alice.store();
    assert!(
        wait_for(SPEC_WAIT_MAX, || {
            store
                .peek(&op_id)
                .map(|d| d.operation_state == OperationState::Cleanup)
                .unwrap_or(false)
        })
        .await,
        "cleanup should start"
    );

    // Kill the coordinator immediately after Phase 1
    alice.shutdown().await;

    // Carol observes cleanup with an expired detection timestamp,
    // inherits coordination, and completes the protocol
    assert!(
        wait_for(SPEC_WAIT_MAX, || !store.exists(&op_id)).await,
        "carol should inherit coordination and archive the document"
    );
    assert!(store.backups_dir(&op_id).join("operation.json").exists());

    carol.shutdown().await;
}
