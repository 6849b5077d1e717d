// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

const FAST: Duration = Duration::from_millis(5);

#[tokio::test]
async fn poll_until_returns_once_condition_holds() {
    let mut count = 0;
    poll_until(
        || {
            count += 1;
            count >= 3
        },
        FAST,
        Some(Duration::from_secs(1)),
        "counter",
    )
    .await
    .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn poll_until_times_out() {
    let err = poll_until(|| false, FAST, Some(Duration::from_millis(30)), "never")
        .await
        .unwrap_err();
    match err {
        PollError::Timeout { what, .. } => assert_eq!(what, "never"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn poll_file_reads_file_written_later() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("result.json");

    let writer_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::fs::write(&writer_path, b"{\"answer\":42}").await.unwrap();
    });

    let bytes = poll_file(&path, FAST, Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(bytes, b"{\"answer\":42}");
}

#[tokio::test]
async fn poll_file_timeout_leaves_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.json");
    let err = poll_file(&path, FAST, Some(Duration::from_millis(30))).await.unwrap_err();
    assert!(matches!(err, PollError::Timeout { .. }));
    assert!(!path.exists());
}

#[tokio::test]
async fn poll_files_waits_for_all() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.out");
    let b = dir.path().join("b.out");
    tokio::fs::write(&a, b"a").await.unwrap();

    let writer = b.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::fs::write(&writer, b"b").await.unwrap();
    });

    let contents = poll_files(
        &[a.clone(), b.clone()],
        FAST,
        Some(Duration::from_secs(2)),
    )
    .await
    .unwrap();
    assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec()]);
}
