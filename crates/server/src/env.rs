// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server binary.

use std::path::PathBuf;

/// Server version reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port for a locally deployed server.
pub const DEFAULT_PORT: u16 = 19_880;

/// Resolve the base directory:
/// `DPL_BASE_DIR` > `$XDG_STATE_HOME/dpl` > `~/.local/state/dpl`.
pub fn base_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DPL_BASE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("dpl"));
    }
    std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".local/state/dpl"))
}

/// Participant id recorded for server-side bookkeeping.
pub fn participant_id() -> String {
    std::env::var("DPL_PARTICIPANT_ID").unwrap_or_else(|_| "dpld".to_string())
}

/// HTTP port (`DPL_HTTP_PORT`, default 19880).
pub fn http_port() -> u16 {
    std::env::var("DPL_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Optional log file; stderr when unset.
pub fn log_file() -> Option<PathBuf> {
    std::env::var("DPL_LOG_FILE").ok().map(PathBuf::from)
}
