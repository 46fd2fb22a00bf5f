// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest restore.
//!
//! Reconstructs a snapshotted tree by hard-linking blobs into place,
//! falling back to a copy when linking crosses filesystems or is
//! unsupported. Restore is idempotent: entries whose target already
//! holds the right content are left alone.

use crate::cas::BlobStore;
use crate::error::AssetsError;
use crate::manifest::{Manifest, ManifestEntry};
use rn_core::Digest;
use std::fs;
use std::path::Path;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Materialize every manifest entry under `target_dir`.
pub fn restore_from_manifest(
    manifest: &Manifest,
    blobs: &BlobStore,
    target_dir: &Path,
) -> Result<(), AssetsError> {
    for entry in &manifest.entries {
        let target = target_dir.join(&entry.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match (&entry.symlink, &entry.digest) {
            (Some(link_target), _) => restore_symlink(&target, link_target)?,
            (None, Some(digest)) => restore_file(entry, digest, blobs, &target)?,
            (None, None) => {
                // An empty placeholder entry; nothing to materialize
                debug!(path = %entry.path, "manifest entry with no content");
            }
        }
    }
    Ok(())
}

fn restore_file(
    entry: &ManifestEntry,
    digest: &Digest,
    blobs: &BlobStore,
    target: &Path,
) -> Result<(), AssetsError> {
    let blob = blobs.get_blob_path(digest)?;

    if target.exists() {
        if Digest::of_bytes(&fs::read(target)?) == *digest {
            return Ok(());
        }
        fs::remove_file(target)?;
    }

    if fs::hard_link(&blob, target).is_err() {
        // Cross-filesystem or unsupported: copy instead
        fs::copy(&blob, target)?;
    }
    set_mode(target, entry.mode)?;
    Ok(())
}

fn restore_symlink(target: &Path, link_target: &str) -> Result<(), AssetsError> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(target)?.to_string_lossy() == link_target {
                return Ok(());
            }
            fs::remove_file(target)?;
        }
        Ok(_) => fs::remove_file(target)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    make_symlink(link_target, target)?;
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link_target: &str, at: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link_target, at)
}

#[cfg(not(unix))]
fn make_symlink(link_target: &str, at: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(link_target, at)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
