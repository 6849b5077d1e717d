// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File and condition pollers used by spawned workers.
//!
//! Pollers never touch the operation document; a timeout raises
//! [`PollError::Timeout`] and nothing else happens.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { elapsed: Duration, what: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Poll `condition` every `interval` until it returns true.
pub async fn poll_until<F>(
    mut condition: F,
    interval: Duration,
    timeout: Option<Duration>,
    what: &str,
) -> Result<(), PollError>
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if let Some(t) = timeout {
            if started.elapsed() >= t {
                return Err(PollError::Timeout {
                    elapsed: started.elapsed(),
                    what: what.to_string(),
                });
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Wait for `path` to exist, then read it.
pub async fn poll_file(
    path: &Path,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, PollError> {
    poll_until(
        || path.exists(),
        interval,
        timeout,
        &path.display().to_string(),
    )
    .await?;
    tokio::fs::read(path)
        .await
        .map_err(|source| PollError::Io { path: path.to_path_buf(), source })
}

/// Wait for every path to exist, then read them all in order.
pub async fn poll_files(
    paths: &[PathBuf],
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<Vec<Vec<u8>>, PollError> {
    poll_until(
        || paths.iter().all(|p| p.exists()),
        interval,
        timeout,
        &format!("{} file(s)", paths.len()),
    )
    .await?;
    let mut contents = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| PollError::Io { path: path.clone(), source })?;
        contents.push(bytes);
    }
    Ok(contents)
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
