// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route table and handlers.
//!
//! Every mutation is POST with a JSON body; reads are POST too (the
//! body addresses the operation). `/health` and its `/monitor/status`
//! alias are the only GETs.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dpl_core::{Clock, ErrorKind, SystemClock};
use dpl_engine::{CallOptions, CreateOptions, EngineError, HeartbeatError, JoinOptions};
use dpl_wire::{
    AbortRequest, ApiError, CompleteRequest, CreateOperationRequest, CreateOperationResponse,
    Empty, EndCallRequest, Fail, FailCallRequest, HealthResponse, HeartbeatRequest,
    HeartbeatResponse, JoinOperationRequest, JoinOperationResponse, LeaveOperationRequest,
    LogRequest, Ok as OkBody, StartCallRequest, StartCallResponse, StateRequest, StateResponse,
};
use std::sync::Arc;
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/monitor/status", get(health))
        .route("/operation/create", post(create_operation))
        .route("/operation/join", post(join_operation))
        .route("/operation/leave", post(leave_operation))
        .route("/operation/complete", post(complete_operation))
        .route("/operation/heartbeat", post(heartbeat))
        .route("/operation/abort", post(abort))
        .route("/operation/state", post(operation_state))
        .route("/operation/log", post(append_log))
        .route("/call/start", post(start_call))
        .route("/call/end", post(end_call))
        .route("/call/fail", post(fail_call))
        .with_state(state)
}

/// Error wrapper mapping kinds onto HTTP statuses.
struct ServerError(ApiError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(Fail::new(self.0))).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(e: EngineError) -> Self {
        Self(ApiError::new(e.kind(), e.to_string()))
    }
}

impl From<dpl_store::StoreError> for ServerError {
    fn from(e: dpl_store::StoreError) -> Self {
        Self(ApiError::new(e.kind(), e.to_string()))
    }
}

impl From<HeartbeatError> for ServerError {
    fn from(e: HeartbeatError) -> Self {
        Self(ApiError::new(e.kind, e.message))
    }
}

fn no_session(operation: &dpl_core::OperationId) -> ServerError {
    ServerError(ApiError::new(
        ErrorKind::NotFound,
        format!("no joined session for operation {operation}"),
    ))
}

type Result<T> = std::result::Result<T, ServerError>;

async fn health(State(state): State<Arc<AppState>>) -> Json<OkBody<HealthResponse>> {
    Json(OkBody::new(HealthResponse {
        status: "ok".into(),
        participant_id: state.participant_id().to_string(),
        operation_count: state.operation_count(),
        version: crate::env::VERSION.into(),
    }))
}

async fn create_operation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOperationRequest>,
) -> Result<Json<OkBody<CreateOperationResponse>>> {
    if req.participant_id.is_empty() {
        return Err(ServerError(ApiError::new(
            ErrorKind::Validation,
            "participantId must not be empty",
        )));
    }
    let ledger = state.ledger_for(&req.participant_id)?;
    let session = ledger
        .create_operation(
            CreateOptions { operation_id: req.operation_id, description: req.description },
            JoinOptions { participant_pid: req.participant_pid, ..JoinOptions::default() },
        )
        .await?;
    let operation_id = session.operation_id().clone();
    let (session_id, _) = state.track_session(session);
    info!(operation = %operation_id, participant = %req.participant_id, "operation created");
    Ok(Json(OkBody::new(CreateOperationResponse { operation_id, session_id })))
}

async fn join_operation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinOperationRequest>,
) -> Result<Json<OkBody<JoinOperationResponse>>> {
    let ledger = state.ledger_for(&req.participant_id)?;
    let session = ledger
        .join_operation(
            &req.operation_id,
            JoinOptions { participant_pid: req.participant_pid, ..JoinOptions::default() },
        )
        .await?;
    let doc = session.state().await?;
    let (session_id, _) = state.track_session(session);
    Ok(Json(OkBody::new(JoinOperationResponse {
        operation_id: req.operation_id,
        session_id,
        initiator_id: doc.initiator_id.as_str().to_string(),
    })))
}

async fn leave_operation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LeaveOperationRequest>,
) -> Result<Json<OkBody<Empty>>> {
    let session = state
        .session_for(&req.operation_id, req.session_id)
        .ok_or_else(|| no_session(&req.operation_id))?;
    session.leave(req.cancel_pending_calls).await?;
    state.drop_session(&req.operation_id, session.session_id());
    Ok(Json(OkBody::new(Empty {})))
}

async fn complete_operation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<OkBody<Empty>>> {
    let session = state
        .session_for(&req.operation_id, None)
        .ok_or_else(|| no_session(&req.operation_id))?;
    session.complete().await?;
    state.drop_operation(&req.operation_id);
    info!(operation = %req.operation_id, "operation completed");
    Ok(Json(OkBody::new(Empty {})))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<OkBody<HeartbeatResponse>>> {
    let session = state
        .session_for(&req.operation_id, None)
        .ok_or_else(|| no_session(&req.operation_id))?;
    let result = session.heartbeat_now().await?;
    Ok(Json(OkBody::new(HeartbeatResponse {
        operation_id: req.operation_id,
        operation_state: result.after.operation_state.to_string(),
        participant_ages_ms: result
            .participant_ages
            .iter()
            .map(|(p, age)| (p.as_str().to_string(), age.as_millis() as u64))
            .collect(),
        stale_participants: result
            .stale_participants
            .iter()
            .map(|p| p.as_str().to_string())
            .collect(),
    })))
}

async fn abort(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AbortRequest>,
) -> Result<Json<OkBody<Empty>>> {
    let store = state.store();
    let now = SystemClock.now_utc();
    let holder = state.participant_id().to_string();
    tokio::task::spawn_blocking(move || {
        store.update(&req.operation_id, &holder, now, |doc| {
            doc.aborted = req.value;
            Ok(())
        })
    })
    .await
    .map_err(|e| ServerError(ApiError::new(ErrorKind::IoError, e.to_string())))??;
    Ok(Json(OkBody::new(Empty {})))
}

async fn operation_state(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StateRequest>,
) -> Result<Json<OkBody<StateResponse>>> {
    let store = state.store();
    let holder = state.participant_id().to_string();
    let doc =
        tokio::task::spawn_blocking(move || store.read(&req.operation_id, &holder))
            .await
            .map_err(|e| ServerError(ApiError::new(ErrorKind::IoError, e.to_string())))??;
    Ok(Json(OkBody::new(StateResponse { document: doc })))
}

async fn append_log(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogRequest>,
) -> Result<Json<OkBody<Empty>>> {
    let store = state.store();
    let now = SystemClock.now_utc();
    let level = req.level.unwrap_or_else(|| "info".to_string());
    tokio::task::spawn_blocking(move || {
        store.append_log(&req.operation_id, &level, &req.message, now)
    })
    .await
    .map_err(|e| ServerError(ApiError::new(ErrorKind::IoError, e.to_string())))??;
    Ok(Json(OkBody::new(Empty {})))
}

async fn start_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartCallRequest>,
) -> Result<Json<OkBody<StartCallResponse>>> {
    let session = state
        .session_for(&req.operation_id, Some(req.session_id))
        .ok_or_else(|| no_session(&req.operation_id))?;
    let call = session
        .start_call::<serde_json::Value>(CallOptions {
            description: req.description,
            fail_on_crash: req.fail_on_crash,
            supervisor_id: req.supervisor_id,
            supervisor_handle: req.supervisor_handle,
            ..CallOptions::default()
        })
        .await?;
    let call = state.track_call(call);
    Ok(Json(OkBody::new(StartCallResponse { call_id: call.call_id().clone() })))
}

async fn end_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EndCallRequest>,
) -> Result<Json<OkBody<Empty>>> {
    let call = state.take_call(&req.call_id).ok_or_else(|| {
        ServerError(ApiError::new(ErrorKind::NotFound, format!("call not found: {}", req.call_id)))
    })?;
    call.end(req.result).await?;
    Ok(Json(OkBody::new(Empty {})))
}

async fn fail_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FailCallRequest>,
) -> Result<Json<OkBody<Empty>>> {
    let call = state.take_call(&req.call_id).ok_or_else(|| {
        ServerError(ApiError::new(ErrorKind::NotFound, format!("call not found: {}", req.call_id)))
    })?;
    call.fail(&req.error, req.stack_trace.as_deref()).await?;
    Ok(Json(OkBody::new(Empty {})))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
