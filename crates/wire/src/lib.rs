// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-wire: HTTP body types shared by the server and client.
//!
//! Every endpoint is POST with a JSON body (reads included); responses
//! carry `{"ok": true, ...}` on success or
//! `{"ok": false, "error": {"type", "message"}}` with a status code
//! reflecting the error kind.

mod request;
mod response;

pub use request::{
    AbortRequest, CompleteRequest, CreateOperationRequest, EndCallRequest, FailCallRequest,
    HeartbeatRequest, JoinOperationRequest, LeaveOperationRequest, LogRequest, StartCallRequest,
    StateRequest,
};
pub use response::{
    ApiError, CreateOperationResponse, Empty, Fail, HealthResponse, HeartbeatResponse,
    JoinOperationResponse, Ok, StartCallResponse, StateResponse,
};
