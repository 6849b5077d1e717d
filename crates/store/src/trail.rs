// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trail snapshots: one copy of the document per mutation.
//!
//! Snapshot names are the elapsed time since operation start in
//! `SSSSSS.mmm` form, so a sorted directory listing replays the mutation
//! history. A name collision (two writes within the same millisecond)
//! gets a numeric suffix. The trail is bounded; the oldest snapshots are
//! pruned first.

use chrono::{DateTime, Utc};
use dpl_core::time_fmt::elapsed_stamp;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Write `bytes` as the next trail snapshot and prune to `max` entries.
pub fn append_snapshot(
    trails_dir: &Path,
    start_time: DateTime<Utc>,
    now: DateTime<Utc>,
    bytes: &[u8],
    max: usize,
) -> io::Result<PathBuf> {
    fs::create_dir_all(trails_dir)?;
    let stamp = elapsed_stamp(start_time, now);

    let mut path = trails_dir.join(format!("{stamp}.json"));
    let mut suffix = 2u32;
    while path.exists() {
        path = trails_dir.join(format!("{stamp}-{suffix}.json"));
        suffix += 1;
    }

    fs::write(&path, bytes)?;
    prune(trails_dir, max)?;
    Ok(path)
}

/// Most recent snapshot in the trail, if any.
pub fn latest_snapshot(trails_dir: &Path) -> Option<PathBuf> {
    snapshot_names(trails_dir).ok()?.into_iter().next_back().map(|n| trails_dir.join(n))
}

/// Delete the oldest snapshots until at most `max` remain.
pub fn prune(trails_dir: &Path, max: usize) -> io::Result<()> {
    let names = snapshot_names(trails_dir)?;
    if names.len() <= max {
        return Ok(());
    }
    let excess = names.len() - max;
    for name in names.into_iter().take(excess) {
        let _ = fs::remove_file(trails_dir.join(name));
    }
    Ok(())
}

/// Move the live document into the backup directory and keep the last
/// trail snapshot beside it.
pub fn backup_operation(
    backups_dir: &Path,
    doc_path: &Path,
    trails_dir: &Path,
) -> io::Result<()> {
    fs::create_dir_all(backups_dir)?;
    fs::rename(doc_path, backups_dir.join("operation.json"))?;
    if let Some(trail) = latest_snapshot(trails_dir) {
        if let Some(name) = trail.file_name() {
            let _ = fs::copy(&trail, backups_dir.join(name));
        }
    }
    Ok(())
}

/// Sorted (oldest-first) `.json` snapshot names; the stamp format makes
/// lexicographic order chronological.
fn snapshot_names(trails_dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = match fs::read_dir(trails_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".json") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
#[path = "trail_tests.rs"]
mod tests;
