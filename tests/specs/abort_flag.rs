// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Abort flag: every handle's abort future resolves, nothing else moves.

use crate::prelude::*;

#[tokio::test]
async fn abort_flag_resolves_every_participants_watch() {
    let dir = tempfile::TempDir::new().unwrap();
    let alice = participant(&dir, "a");
    let bob = participant(&dir, "b");

    let a_session = alice
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();
    let op_id = a_session.operation_id().clone();
    let b_session = bob.join_operation(&op_id, JoinOptions::default()).await.unwrap();

    b_session.set_abort_flag(true).await.unwrap();

    // Both handles observe the flag on their next heartbeat
    assert!(
        wait_for(SPEC_WAIT_MAX, || *a_session.abort_watch().borrow()).await,
        "alice's abort future should resolve"
    );
    assert!(
        wait_for(SPEC_WAIT_MAX, || *b_session.abort_watch().borrow()).await,
        "bob's abort future should resolve"
    );
    // The awaitable form resolves immediately once the watch is set
    a_session.aborted().await;

    // The flag alone changes nothing: still running, frames intact
    let doc = a_session.state().await.unwrap();
    assert_eq!(doc.operation_state, OperationState::Running);
    assert!(doc.aborted);

    alice.shutdown().await;
    bob.shutdown().await;
}
