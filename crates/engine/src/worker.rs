// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-worker combinators over the spawned-call primitive.
//!
//! Each combinator spawns a child process (attached to the call so
//! `kill` can reach it), waits for a result artifact, parses it with a
//! caller-supplied deserializer and resolves the call with the value.

use crate::error::EngineError;
use crate::operation::Session;
use crate::poll;
use crate::spawned::{SpawnOptions, SpawnedCall};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Options shared by the worker combinators.
pub struct WorkerOptions {
    pub description: Option<String>,
    pub fail_on_crash: bool,
    /// How often to look for the result artifact.
    pub poll_interval: Duration,
    /// Overall deadline for the artifact.
    pub timeout: Option<Duration>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            description: None,
            fail_on_crash: true,
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

impl WorkerOptions {
    fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            description: self.description.clone(),
            fail_on_crash: self.fail_on_crash,
            ..SpawnOptions::new()
        }
    }
}

/// Run `command`, poll `result_path` until the worker writes it, parse
/// the bytes. The file is removed after a successful parse.
pub async fn exec_file_result_worker<T, P>(
    session: &Session,
    mut command: Command,
    result_path: PathBuf,
    parse: P,
    opts: WorkerOptions,
) -> Result<SpawnedCall<T>, EngineError>
where
    T: Clone + Send + Sync + 'static,
    P: Fn(&[u8]) -> Result<T, String> + Send + Sync + 'static,
{
    let poll_interval = opts.poll_interval;
    let timeout = opts.timeout;
    session
        .spawn_call(opts.spawn_options(), move |ctx| async move {
            command.kill_on_drop(true);
            let mut child = command
                .spawn()
                .map_err(|e| EngineError::Task(format!("failed to spawn worker: {e}")))?;
            if let Some(pid) = child.id() {
                ctx.attach_child_pid(pid);
            }

            let bytes = tokio::select! {
                result = poll::poll_file(&result_path, poll_interval, timeout) => {
                    result.map_err(|e| EngineError::Task(e.to_string()))?
                }
                _ = ctx.cancelled() => {
                    let _ = child.start_kill();
                    return Err(EngineError::CallCancelled(ctx.call_id.clone()));
                }
            };

            let value = parse(&bytes).map_err(EngineError::Task)?;
            let _ = tokio::fs::remove_file(&result_path).await;
            let _ = child.wait().await;
            debug!(call = %ctx.call_id, "file-result worker finished");
            Ok(value)
        })
        .await
}

/// Run `command` to completion and parse its stdout.
pub async fn exec_stdio_worker<T, P>(
    session: &Session,
    mut command: Command,
    parse: P,
    opts: WorkerOptions,
) -> Result<SpawnedCall<T>, EngineError>
where
    T: Clone + Send + Sync + 'static,
    P: Fn(&[u8]) -> Result<T, String> + Send + Sync + 'static,
{
    session
        .spawn_call(opts.spawn_options(), move |ctx| async move {
            command.stdout(Stdio::piped()).kill_on_drop(true);
            let mut child = command
                .spawn()
                .map_err(|e| EngineError::Task(format!("failed to spawn worker: {e}")))?;
            if let Some(pid) = child.id() {
                ctx.attach_child_pid(pid);
            }

            let output = tokio::select! {
                output = child.wait_with_output() => {
                    output.map_err(|e| EngineError::Task(format!("worker wait failed: {e}")))?
                }
                _ = ctx.cancelled() => {
                    return Err(EngineError::CallCancelled(ctx.call_id.clone()));
                }
            };
            if !output.status.success() {
                return Err(EngineError::Task(format!(
                    "worker exited with {}",
                    output.status
                )));
            }
            parse(&output.stdout).map_err(EngineError::Task)
        })
        .await
}

/// Start a long-lived server child and resolve once its readiness
/// artifact appears. The child keeps running; stop it through
/// [`SpawnedCall::kill`].
pub async fn exec_server_request<T, P>(
    session: &Session,
    mut command: Command,
    ready_path: PathBuf,
    parse: P,
    opts: WorkerOptions,
) -> Result<SpawnedCall<T>, EngineError>
where
    T: Clone + Send + Sync + 'static,
    P: Fn(&[u8]) -> Result<T, String> + Send + Sync + 'static,
{
    let poll_interval = opts.poll_interval;
    let timeout = opts.timeout;
    session
        .spawn_call(opts.spawn_options(), move |ctx| async move {
            let mut child = command
                .spawn()
                .map_err(|e| EngineError::Task(format!("failed to spawn server: {e}")))?;
            if let Some(pid) = child.id() {
                ctx.attach_child_pid(pid);
            }

            let bytes = tokio::select! {
                result = poll::poll_file(&ready_path, poll_interval, timeout) => {
                    result.map_err(|e| EngineError::Task(e.to_string()))?
                }
                _ = ctx.cancelled() => {
                    let _ = child.start_kill();
                    return Err(EngineError::CallCancelled(ctx.call_id.clone()));
                }
            };
            // The server stays up; releasing the handle must not kill it
            drop(child);
            parse(&bytes).map_err(EngineError::Task)
        })
        .await
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
