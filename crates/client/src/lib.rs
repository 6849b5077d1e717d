// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-client: HTTP client mirroring the local ledger API.
//!
//! The server only mediates file operations; callbacks and result
//! parsing stay on this side of the wire. [`discover`] finds a server on
//! the local network by probing `/health`.

mod client;
mod discover;

pub use client::{ClientError, RemoteLedger};
pub use discover::{discover, DiscoverOptions};
