// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two participants race `start_call` on the same operation: both must
//! win, no frame may be lost, and each mutation leaves a trail
//! snapshot.

use crate::prelude::*;

#[tokio::test]
async fn racing_start_calls_both_succeed() {
    let dir = tempfile::TempDir::new().unwrap();
    // Quiet heartbeats so only our mutations write the document
    let alice = quiet_participant(&dir, "a");
    let bob = quiet_participant(&dir, "b");

    let a_session = alice
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();
    let op_id = a_session.operation_id().clone();
    let b_session = bob.join_operation(&op_id, JoinOptions::default()).await.unwrap();

    let store = alice.store();
    let trails_before = std::fs::read_dir(store.trails_dir(&op_id)).unwrap().count();

    let (a_call, b_call) = tokio::join!(
        a_session.start_call::<()>(CallOptions::described("a-work")),
        b_session.start_call::<()>(CallOptions::described("b-work")),
    );
    let a_call = a_call.unwrap();
    let b_call = b_call.unwrap();
    assert_ne!(a_call.call_id(), b_call.call_id());

    // Both frames are present, in call order per participant
    let doc = a_session.state().await.unwrap();
    assert_eq!(doc.call_frames.len(), 2);
    let participants: Vec<&str> =
        doc.call_frames.iter().map(|f| f.participant_id.as_str()).collect();
    assert!(participants.contains(&"a"));
    assert!(participants.contains(&"b"));

    // Exactly two new snapshots: one per serialized mutation
    let trails_after = std::fs::read_dir(store.trails_dir(&op_id)).unwrap().count();
    assert_eq!(trails_after - trails_before, 2);

    // No lock file remains
    assert!(!store.lock_path(&op_id).exists());

    a_call.end(None).await.unwrap();
    b_call.end(None).await.unwrap();
    alice.shutdown().await;
    bob.shutdown().await;
}
