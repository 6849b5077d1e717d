// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn fast_settings() -> LockSettings {
    LockSettings {
        timeout: Duration::from_millis(200),
        retry_interval: Duration::from_millis(5),
        stale_limit: Duration::from_millis(150),
    }
}

#[test]
fn acquire_creates_lock_file_with_payload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op1.operation.json.lock");

    let guard = LockGuard::acquire(&path, "participant-a", LockOp::Write, &fast_settings())
        .unwrap();
    assert!(path.exists());

    let info: LockInfo = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.holder_id, "participant-a");
    assert_eq!(info.pid, std::process::id());
    assert_eq!(info.op, LockOp::Write);

    guard.release().unwrap();
    assert!(!path.exists());
}

#[test]
fn lock_payload_uses_camel_case_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");
    let _guard =
        LockGuard::acquire(&path, "p", LockOp::Read, &fast_settings()).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(json.get("holderId").is_some());
    assert!(json.get("acquiredAt").is_some());
    assert_eq!(json["op"], "read");
}

#[test]
fn second_acquire_times_out_while_held() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");
    let settings = LockSettings {
        // Holder stays fresh for the duration of the test
        stale_limit: Duration::from_secs(60),
        ..fast_settings()
    };

    let _held = LockGuard::acquire(&path, "first", LockOp::Write, &settings).unwrap();
    let err = LockGuard::acquire(&path, "second", LockOp::Write, &settings).unwrap_err();
    match err {
        LockError::Timeout { holder, .. } => {
            assert!(holder.unwrap().contains("first"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn dead_holder_lock_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");

    // PID 4194304 is beyond the Linux pid range, guaranteed dead
    let stale = LockInfo {
        holder_id: "ghost".into(),
        pid: 4_194_304,
        acquired_at: Utc::now(),
        op: LockOp::Write,
    };
    fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();

    let guard = LockGuard::acquire(&path, "live", LockOp::Write, &fast_settings()).unwrap();
    let info: LockInfo = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.holder_id, "live");
    drop(guard);
}

#[test]
fn expired_lock_is_reclaimed_even_with_live_holder() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");

    let old = LockInfo {
        holder_id: "slow".into(),
        pid: std::process::id(),
        acquired_at: Utc::now() - chrono::Duration::seconds(10),
        op: LockOp::Write,
    };
    fs::write(&path, serde_json::to_vec(&old).unwrap()).unwrap();

    let guard = LockGuard::acquire(&path, "fresh", LockOp::Write, &fast_settings()).unwrap();
    let info: LockInfo = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.holder_id, "fresh");
    drop(guard);
}

#[test]
fn malformed_lock_file_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");
    fs::write(&path, b"not json at all").unwrap();

    let guard = LockGuard::acquire(&path, "p", LockOp::Write, &fast_settings()).unwrap();
    drop(guard);
    assert!(!path.exists());
}

#[test]
fn guard_drop_releases_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");
    {
        let _guard =
            LockGuard::acquire(&path, "p", LockOp::Write, &fast_settings()).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());
}

#[test]
fn release_after_lock_stolen_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("op.lock");
    let guard = LockGuard::acquire(&path, "p", LockOp::Write, &fast_settings()).unwrap();
    fs::remove_file(&path).unwrap();
    guard.release().unwrap();
}
