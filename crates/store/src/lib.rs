// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-store: the on-disk ledger store.
//!
//! One JSON document per operation, mutated only through an atomic
//! read-modify-write transaction under a named lock file, with a trail
//! of per-mutation snapshots and terminal backups for post-mortem.
//!
//! Layout under the base path:
//!
//! ```text
//! <operationId>.operation.json        live document
//! <operationId>.operation.json.lock   lock file
//! backups/<operationId>/              terminal snapshots
//! trails/<operationId>/<elapsed>.json per-mutation snapshots
//! logs/<operationId>.log              operation log (append-only)
//! ```

mod lock;
mod store;
mod trail;

pub use lock::{LockError, LockGuard, LockInfo, LockOp, LockSettings};
pub use store::{LedgerStore, StoreError, StoreSettings};
pub use trail::latest_snapshot;
