// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::hooks::JoinOptions;
use crate::ledger::{CreateOptions, Ledger};
use dpl_core::LedgerConfig;
use tempfile::TempDir;

fn test_ledger(dir: &TempDir) -> Ledger {
    Ledger::new("worker-host", LedgerConfig::for_tests(dir.path())).unwrap()
}

fn parse_i64(bytes: &[u8]) -> Result<i64, String> {
    String::from_utf8_lossy(bytes).trim().parse().map_err(|e| format!("bad number: {e}"))
}

#[tokio::test]
async fn stdio_worker_parses_stdout() {
    let dir = TempDir::new().unwrap();
    let ledger = test_ledger(&dir);
    let session = ledger
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();

    let mut cmd = Command::new("echo");
    cmd.arg("42");
    let call = exec_stdio_worker(&session, cmd, parse_i64, WorkerOptions::default())
        .await
        .unwrap();

    assert_eq!(call.wait().await.unwrap(), 42);
    session.leave(false).await.unwrap();
}

#[tokio::test]
async fn stdio_worker_failure_is_contained_when_asked() {
    let dir = TempDir::new().unwrap();
    let ledger = test_ledger(&dir);
    let session = ledger
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();

    let mut cmd = Command::new("sh");
    cmd.args(["-c", "exit 3"]);
    let call = exec_stdio_worker(
        &session,
        cmd,
        parse_i64,
        WorkerOptions { fail_on_crash: false, ..WorkerOptions::default() },
    )
    .await
    .unwrap();

    assert!(call.wait().await.is_err());
    assert!(call.is_failed());
    let doc = session.state().await.unwrap();
    assert!(!doc.aborted);
    session.leave(false).await.unwrap();
}

#[tokio::test]
async fn file_result_worker_reads_artifact_and_removes_it() {
    let dir = TempDir::new().unwrap();
    let ledger = test_ledger(&dir);
    let session = ledger
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();

    let result_path = dir.path().join("result.txt");
    let mut cmd = Command::new("sh");
    cmd.args(["-c", &format!("echo 7 > {}", result_path.display())]);

    let call = exec_file_result_worker(
        &session,
        cmd,
        result_path.clone(),
        parse_i64,
        WorkerOptions { timeout: Some(Duration::from_secs(5)), ..WorkerOptions::default() },
    )
    .await
    .unwrap();

    assert_eq!(call.wait().await.unwrap(), 7);
    assert!(!result_path.exists());
    session.leave(false).await.unwrap();
}

#[tokio::test]
async fn file_result_worker_times_out_without_artifact() {
    let dir = TempDir::new().unwrap();
    let ledger = test_ledger(&dir);
    let session = ledger
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();

    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let call = exec_file_result_worker(
        &session,
        cmd,
        dir.path().join("never.txt"),
        parse_i64,
        WorkerOptions {
            fail_on_crash: false,
            timeout: Some(Duration::from_millis(100)),
            ..WorkerOptions::default()
        },
    )
    .await
    .unwrap();

    let err = call.wait().await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
    session.leave(false).await.unwrap();
}

#[tokio::test]
async fn cancelling_a_worker_kills_the_child() {
    let dir = TempDir::new().unwrap();
    let ledger = test_ledger(&dir);
    let session = ledger
        .create_operation(CreateOptions::default(), JoinOptions::default())
        .await
        .unwrap();

    let mut cmd = Command::new("sleep");
    cmd.arg("30");
    let call = exec_file_result_worker(
        &session,
        cmd,
        dir.path().join("never.txt"),
        parse_i64,
        WorkerOptions { fail_on_crash: false, ..WorkerOptions::default() },
    )
    .await
    .unwrap();

    // Give the child a moment to start, then cancel
    tokio::time::sleep(Duration::from_millis(50)).await;
    call.cancel();
    assert!(call.is_cancelled());
    assert!(call.wait().await.is_err());
    session.leave(true).await.unwrap();
}
