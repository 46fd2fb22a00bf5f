// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphaned-blob collection.
//!
//! Mark: read every published manifest and every run's asset reference
//! to build the reachable digest set. Sweep: walk `blobs/` and delete
//! files outside the set. The whole pass holds the assets lock
//! exclusively, and the mark phase runs after the lock is held so a
//! snapshot that finished just before cannot lose blobs.

use crate::error::AssetsError;
use crate::lock::AssetsLock;
use crate::manifest::Manifest;
use rn_core::{DataRoot, Digest, RunId};
use std::collections::HashSet;
use std::fs;
use tracing::{info, warn};

/// Result of one GC pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcOutcome {
    pub reachable: usize,
    pub deleted: usize,
}

/// Delete blobs referenced by no manifest and no run.
pub fn cleanup_orphaned_blobs(root: &DataRoot) -> Result<GcOutcome, AssetsError> {
    let _lock = AssetsLock::exclusive(&root.assets_lock_path())?;

    let reachable = reachable_digests(root)?;
    let mut outcome = GcOutcome {
        reachable: reachable.len(),
        deleted: 0,
    };

    let blobs_dir = root.blobs_dir();
    if !blobs_dir.is_dir() {
        return Ok(outcome);
    }

    for shard_a in read_dir_sorted(&blobs_dir)? {
        if !shard_a.is_dir() || shard_a.file_name().is_some_and(|n| n == "tmp") {
            continue;
        }
        for shard_b in read_dir_sorted(&shard_a)? {
            if !shard_b.is_dir() {
                continue;
            }
            for blob in read_dir_sorted(&shard_b)? {
                let Some(name) = blob.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Ok(digest) = Digest::parse(name) else {
                    warn!(path = %blob.display(), "unrecognized file in blobs tree");
                    continue;
                };
                if reachable.contains(&digest) {
                    continue;
                }
                fs::remove_file(&blob)?;
                outcome.deleted += 1;
            }
        }
    }

    info!(
        reachable = outcome.reachable,
        deleted = outcome.deleted,
        "orphaned blob sweep complete",
    );
    Ok(outcome)
}

fn reachable_digests(root: &DataRoot) -> Result<HashSet<Digest>, AssetsError> {
    let mut reachable = HashSet::new();

    let manifests_dir = root.manifests_dir();
    if manifests_dir.is_dir() {
        for path in read_dir_sorted(&manifests_dir)? {
            if path.extension().is_some_and(|e| e == "json") {
                match Manifest::load(&path) {
                    Ok(manifest) => reachable.extend(manifest.digests().cloned()),
                    Err(e) => warn!(path = %path.display(), error = %e, "unreadable manifest kept out of mark set"),
                }
            }
        }
    }

    let runs_dir = root.runs_dir();
    if runs_dir.is_dir() {
        for run_dir in read_dir_sorted(&runs_dir)? {
            let Some(name) = run_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(run_id) = RunId::validate(name) else {
                continue;
            };
            let reference = root.run(&run_id).assets_manifest();
            if reference.is_file() {
                match Manifest::load(&reference) {
                    Ok(manifest) => reachable.extend(manifest.digests().cloned()),
                    Err(e) => warn!(run = name, error = %e, "unreadable run asset reference"),
                }
            }
        }
    }

    Ok(reachable)
}

fn read_dir_sorted(dir: &std::path::Path) -> Result<Vec<std::path::PathBuf>, AssetsError> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[path = "gc_tests.rs"]
mod tests;
