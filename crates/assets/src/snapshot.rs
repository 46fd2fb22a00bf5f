// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace snapshotting.
//!
//! Walks a tree lexicographically, prunes ignored directories, stores
//! every kept file into the blob store, and publishes a manifest. The
//! manifest is written only after all its blobs are durable, and the
//! whole operation holds the assets lock in shared mode so GC cannot
//! interleave.

use crate::cas::BlobStore;
use crate::error::AssetsError;
use crate::lock::AssetsLock;
use crate::manifest::{Manifest, ManifestEntry};
use crate::rnignore::IgnoreRules;
use rn_core::{DataRoot, RunId};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Options for [`snapshot_workspace`].
#[derive(Default)]
pub struct SnapshotOptions {
    /// Explicit rules; `None` loads the workspace's `.rnignore`.
    pub ignore: Option<IgnoreRules>,
    /// Also record the manifest under this run's `assets/` directory.
    pub run_id: Option<RunId>,
}

/// Snapshot `workspace` into the blob store and publish the manifest
/// under `manifests/<snapshot_id>.json`.
pub fn snapshot_workspace(
    root: &DataRoot,
    blobs: &BlobStore,
    workspace: &Path,
    options: SnapshotOptions,
) -> Result<Manifest, AssetsError> {
    let _lock = AssetsLock::shared(&root.assets_lock_path())?;

    let rules = match options.ignore {
        Some(rules) => rules,
        None => IgnoreRules::load(workspace)?,
    };

    let mut entries = Vec::new();
    walk(workspace, workspace, &rules, blobs, &mut entries)?;

    let root_name = workspace
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace");
    let manifest = Manifest::assemble(root_name, entries)?;

    let published = root
        .manifests_dir()
        .join(format!("{}.json", manifest.snapshot_id));
    manifest.save(&published)?;

    if let Some(run_id) = &options.run_id {
        manifest.save(&root.run(run_id).assets_manifest())?;
    }

    info!(
        snapshot = %manifest.snapshot_id,
        entries = manifest.entries.len(),
        "workspace snapshot published",
    );
    Ok(manifest)
}

/// Snapshot a single file.
pub fn archive_file(
    root: &DataRoot,
    blobs: &BlobStore,
    file: &Path,
) -> Result<Manifest, AssetsError> {
    let _lock = AssetsLock::shared(&root.assets_lock_path())?;
    let meta = fs::symlink_metadata(file)?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    let entry = file_entry(file, &name, &meta, blobs)?;
    let manifest = Manifest::assemble(name, vec![entry])?;
    let published = root
        .manifests_dir()
        .join(format!("{}.json", manifest.snapshot_id));
    manifest.save(&published)?;
    Ok(manifest)
}

/// Snapshot a directory without consulting any ignore file.
pub fn archive_dir(
    root: &DataRoot,
    blobs: &BlobStore,
    dir: &Path,
) -> Result<Manifest, AssetsError> {
    snapshot_workspace(
        root,
        blobs,
        dir,
        SnapshotOptions {
            ignore: Some(IgnoreRules::none(dir)),
            run_id: None,
        },
    )
}

fn walk(
    workspace: &Path,
    dir: &Path,
    rules: &IgnoreRules,
    blobs: &BlobStore,
    entries: &mut Vec<ManifestEntry>,
) -> Result<(), AssetsError> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    children.sort();

    for child in children {
        let rel = child
            .strip_prefix(workspace)
            .unwrap_or(&child)
            .to_path_buf();
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if rel_str == crate::rnignore::IGNORE_FILE {
            continue;
        }

        let meta = fs::symlink_metadata(&child)?;

        if meta.is_dir() {
            if rules.is_ignored(&rel, true) {
                continue;
            }
            walk(workspace, &child, rules, blobs, entries)?;
            continue;
        }

        if rules.is_ignored(&rel, false) {
            continue;
        }

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&child)?;
            entries.push(ManifestEntry {
                path: rel_str,
                digest: None,
                size: 0,
                mode: 0o777,
                symlink: Some(target.to_string_lossy().into_owned()),
            });
            continue;
        }

        entries.push(file_entry(&child, &rel_str, &meta, blobs)?);
    }
    Ok(())
}

fn file_entry(
    file: &Path,
    rel: &str,
    meta: &fs::Metadata,
    blobs: &BlobStore,
) -> Result<ManifestEntry, AssetsError> {
    let (digest, size) = blobs.store_file(file)?;
    Ok(ManifestEntry {
        path: rel.to_string(),
        digest: Some(digest),
        size,
        mode: mode_bits(meta),
        symlink: None,
    })
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(_meta: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
