// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A contained crash: one spawned call fails, everything else carries on.

use crate::prelude::*;
use dpl_engine::EngineError;
use std::time::Duration;

#[tokio::test]
async fn failed_spawned_call_does_not_fail_the_operation() {
    let dir = tempfile::TempDir::new().unwrap();
    let ledger = participant(&dir, "a");
    let session = ledger
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();

    let c1 = session
        .spawn_call(SpawnOptions::described("c1").contained(), |_ctx| async {
            Err::<i64, _>(EngineError::Task("work threw".into()))
        })
        .await
        .unwrap();
    let c2 = session
        .spawn_call(SpawnOptions::described("c2").contained(), |_ctx| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(2)
        })
        .await
        .unwrap();
    let c3 = session
        .spawn_call(SpawnOptions::described("c3").contained(), |_ctx| async { Ok(3) })
        .await
        .unwrap();

    let result = sync_calls(
        &session,
        vec![c1.clone(), c2.clone(), c3.clone()],
        Some(Duration::from_secs(5)),
    )
    .await;

    assert!(c1.is_failed());
    assert!(c1.error().unwrap().contains("work threw"));
    assert!(c2.is_success() && c3.is_success());

    assert!(result.has_failed());
    assert!(!result.all_succeeded());
    assert!(!result.operation_failed);
    assert!(result.all_resolved());
    assert_eq!(result.successful.len(), 2);
    assert_eq!(result.failed.len(), 1);

    // The operation is untouched by the contained failure
    let doc = session.state().await.unwrap();
    assert_eq!(doc.operation_state, OperationState::Running);
    assert!(!doc.aborted);

    session.leave(false).await.unwrap();
}
