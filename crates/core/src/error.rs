// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds surfaced at the core boundary.
//!
//! Each crate carries its own `thiserror` enums; this kind is the common
//! classification that crosses crate and wire boundaries (heartbeat
//! callbacks, HTTP error envelopes). The string forms are part of the
//! wire format.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation file missing when expected.
    LedgerNotFound,
    /// Lock timeout or persistent stale-lock contention.
    LockFailed,
    /// The user-requested abort flag transitioned to true.
    AbortFlagSet,
    /// A peer participant is past the staleness threshold.
    HeartbeatStale,
    /// Any other I/O or parse error.
    IoError,
    /// The operation entered cleanup/failed while work was pending.
    OperationFailed,
    /// Graceful shutdown: the operation completed.
    OperationCompleted,
    /// Malformed request or argument.
    Validation,
    /// Mutation not admissible in the current state.
    StateConflict,
    /// Operation or call not found.
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LedgerNotFound => "ledgerNotFound",
            ErrorKind::LockFailed => "lockFailed",
            ErrorKind::AbortFlagSet => "abortFlagSet",
            ErrorKind::HeartbeatStale => "heartbeatStale",
            ErrorKind::IoError => "ioError",
            ErrorKind::OperationFailed => "operationFailed",
            ErrorKind::OperationCompleted => "operationCompleted",
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "stateConflict",
            ErrorKind::NotFound => "notFound",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "ledgerNotFound" => ErrorKind::LedgerNotFound,
            "lockFailed" => ErrorKind::LockFailed,
            "abortFlagSet" => ErrorKind::AbortFlagSet,
            "heartbeatStale" => ErrorKind::HeartbeatStale,
            "ioError" => ErrorKind::IoError,
            "operationFailed" => ErrorKind::OperationFailed,
            "operationCompleted" => ErrorKind::OperationCompleted,
            "validation" => ErrorKind::Validation,
            "stateConflict" => ErrorKind::StateConflict,
            "notFound" => ErrorKind::NotFound,
            _ => return None,
        })
    }

    /// HTTP status carried by the remote surface for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound | ErrorKind::LedgerNotFound => 404,
            ErrorKind::StateConflict
            | ErrorKind::AbortFlagSet
            | ErrorKind::OperationFailed
            | ErrorKind::OperationCompleted => 409,
            ErrorKind::LockFailed => 423,
            ErrorKind::IoError | ErrorKind::HeartbeatStale => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ErrorKind::from_wire(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown error kind: {s:?}"))
        })
    }
}
