// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dpl_core::{CallId, ErrorKind, OperationDoc, OperationId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Success envelope: `{"ok": true, ...payload fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ok<T> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Ok<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Failure envelope: `{"ok": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fail {
    pub ok: bool,
    pub error: ApiError,
}

impl Fail {
    pub fn new(error: ApiError) -> Self {
        Self { ok: false, error }
    }
}

/// Payload with no fields of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationResponse {
    pub operation_id: OperationId,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOperationResponse {
    pub operation_id: OperationId,
    pub session_id: SessionId,
    pub initiator_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub operation_id: OperationId,
    pub operation_state: String,
    /// Heartbeat age per participant, in milliseconds.
    #[serde(default)]
    pub participant_ages_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub stale_participants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub document: OperationDoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallResponse {
    pub call_id: CallId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub participant_id: String,
    pub operation_count: usize,
    pub version: String,
}
