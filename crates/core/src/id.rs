// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for operations, participants, calls and sessions.
//!
//! Operation and call ids travel through the document and over the wire;
//! both are URL-safe strings. Session ids are purely in-process and never
//! appear in a document.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Define a newtype id wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>` and `Borrow<str>` implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id! {
    /// Globally unique operation identifier.
    ///
    /// Clients may supply their own URL-safe id; generated ids embed the
    /// creation timestamp: `op_<epoch-ms>_<rand>`.
    pub struct OperationId;
}

define_string_id! {
    /// Identifies a participant within an operation.
    ///
    /// Chosen by the participant itself (host name, role name, ...);
    /// must be stable for the life of the join.
    pub struct ParticipantId;
}

define_string_id! {
    /// Identifies one call frame within an operation.
    ///
    /// Unique within the operation and never reused after removal.
    pub struct CallId;
}

impl OperationId {
    /// Generate a fresh operation id carrying the creation time.
    pub fn generate(epoch_ms: u64) -> Self {
        Self(format!("op_{}_{}", epoch_ms, nanoid::nanoid!(8, &ID_ALPHABET)))
    }
}

impl CallId {
    /// Generate a fresh call id.
    pub fn generate() -> Self {
        Self(format!("call-{}", nanoid::nanoid!(10, &ID_ALPHABET)))
    }
}

/// URL-safe alphabet without `-` and `_` lookalikes in the random part.
const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// In-process session identifier, monotonic per participant process.
///
/// Sessions are handles onto an operation; they are never persisted and
/// never leave the process that created them, except as an opaque token
/// over the HTTP surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
