// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote ledger client.

use dpl_wire::{
    AbortRequest, ApiError, CompleteRequest, CreateOperationRequest, CreateOperationResponse,
    Empty, EndCallRequest, Fail, FailCallRequest, HealthResponse, HeartbeatRequest,
    HeartbeatResponse, JoinOperationRequest, JoinOperationResponse, LeaveOperationRequest,
    LogRequest, Ok as OkBody, StartCallRequest, StartCallResponse, StateRequest, StateResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no ledger server found on port {0}")]
    Discovery(u16),
}

/// HTTP mirror of the local ledger API.
#[derive(Debug, Clone)]
pub struct RemoteLedger {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteLedger {
    /// Connect to an explicit `host:port`.
    pub fn new(host: &str, port: u16) -> Result<Self, ClientError> {
        Self::with_timeout(host, port, Duration::from_secs(10))
    }

    pub fn with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: format!("http://{host}:{port}"), http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe; falls back to `/monitor/status` for older
    /// deployments.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        match self.get("/health").await {
            Ok(health) => Ok(health),
            Err(ClientError::Transport(_)) | Err(ClientError::Decode(_)) => {
                self.get("/monitor/status").await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_operation(
        &self,
        req: &CreateOperationRequest,
    ) -> Result<CreateOperationResponse, ClientError> {
        self.post("/operation/create", req).await
    }

    pub async fn join_operation(
        &self,
        req: &JoinOperationRequest,
    ) -> Result<JoinOperationResponse, ClientError> {
        self.post("/operation/join", req).await
    }

    pub async fn leave_operation(&self, req: &LeaveOperationRequest) -> Result<(), ClientError> {
        self.post::<_, Empty>("/operation/leave", req).await.map(|_| ())
    }

    pub async fn complete_operation(&self, req: &CompleteRequest) -> Result<(), ClientError> {
        self.post::<_, Empty>("/operation/complete", req).await.map(|_| ())
    }

    pub async fn heartbeat(
        &self,
        req: &HeartbeatRequest,
    ) -> Result<HeartbeatResponse, ClientError> {
        self.post("/operation/heartbeat", req).await
    }

    pub async fn set_abort_flag(&self, req: &AbortRequest) -> Result<(), ClientError> {
        self.post::<_, Empty>("/operation/abort", req).await.map(|_| ())
    }

    pub async fn state(&self, req: &StateRequest) -> Result<StateResponse, ClientError> {
        self.post("/operation/state", req).await
    }

    pub async fn append_log(&self, req: &LogRequest) -> Result<(), ClientError> {
        self.post::<_, Empty>("/operation/log", req).await.map(|_| ())
    }

    pub async fn start_call(
        &self,
        req: &StartCallRequest,
    ) -> Result<StartCallResponse, ClientError> {
        self.post("/call/start", req).await
    }

    pub async fn end_call(&self, req: &EndCallRequest) -> Result<(), ClientError> {
        self.post::<_, Empty>("/call/end", req).await.map(|_| ())
    }

    pub async fn fail_call(&self, req: &FailCallRequest) -> Result<(), ClientError> {
        self.post::<_, Empty>("/call/fail", req).await.map(|_| ())
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        req: &Req,
    ) -> Result<Resp, ClientError> {
        let response =
            self.http.post(format!("{}{path}", self.base_url)).json(req).send().await?;
        Self::decode(response).await
    }

    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, ClientError> {
        let response = self.http.get(format!("{}{path}", self.base_url)).send().await?;
        Self::decode(response).await
    }

    async fn decode<Resp: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Resp, ClientError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if status.is_success() {
            let body: OkBody<Resp> = serde_json::from_slice(&bytes)?;
            Ok(body.data)
        } else {
            match serde_json::from_slice::<Fail>(&bytes) {
                Ok(fail) => Err(fail.error.into()),
                Err(_) => Err(ApiError::new(
                    dpl_core::ErrorKind::IoError,
                    format!("HTTP {status} with unreadable body"),
                )
                .into()),
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
