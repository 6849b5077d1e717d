// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-server: the HTTP remote-access surface.
//!
//! A thin wire mapping over the local ledger API. The server mediates
//! file operations only; user callbacks always execute on the client.
//! Remote sessions and open calls are tracked server-side so later
//! requests can address them by id.

pub mod env;
mod routes;
mod state;

pub use routes::router;
pub use state::AppState;
