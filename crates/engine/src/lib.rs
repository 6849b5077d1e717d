// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-engine: the ledger runtime.
//!
//! Each participant process holds one [`Ledger`]. Creating or joining an
//! operation yields a [`Session`]; the first join per operation starts a
//! heartbeat task that keeps the shared document fresh, watches peers for
//! staleness, and drives the four-phase crash-cleanup protocol when one
//! goes quiet. Calls bracket units of work as frames in the document;
//! spawned calls add a task handle with cancellation and child-process
//! kill support.

mod call;
mod coordinator;
mod error;
mod heartbeat;
mod hooks;
mod ledger;
mod operation;
pub mod poll;
pub mod signal;
mod spawned;
mod sync;
mod worker;

pub use call::{Call, CallOptions};
pub use coordinator::OperationFailedInfo;
pub use error::EngineError;
pub use heartbeat::{HeartbeatError, HeartbeatResult};
pub use hooks::{CleanupFn, HeartbeatHooks, JoinOptions, ParticipantRole, SupervisorHooks};
pub use ledger::{CreateOptions, Ledger};
pub use operation::Session;
pub use poll::{poll_file, poll_files, poll_until, PollError};
pub use spawned::{SpawnContext, SpawnOptions, SpawnedCall};
pub use sync::{await_call, sync_calls, wait_for_completion, SyncResult};
pub use worker::{
    exec_file_result_worker, exec_server_request, exec_stdio_worker, WorkerOptions,
};
