// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot manifests.
//!
//! A manifest is the ordered inventory of a snapshotted tree: one entry
//! per file or symlink with its digest, size, and mode bits. The
//! snapshot id is the SHA-256 of the serialized entries, so identical
//! inputs always produce the identical id.

use crate::error::AssetsError;
use chrono::{DateTime, Utc};
use rn_core::Digest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One file or symlink in a snapshot, with a `/`-separated relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    /// Content digest; absent for symlinks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    pub size: u64,
    /// Permission bits (`mode & 0o777`).
    pub mode: u32,
    /// Symlink target, recorded rather than followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink: Option<String>,
}

/// An ordered snapshot inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub snapshot_id: String,
    pub root_name: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Assemble a manifest, deriving the snapshot id from the entries.
    pub fn assemble(
        root_name: impl Into<String>,
        entries: Vec<ManifestEntry>,
    ) -> Result<Manifest, AssetsError> {
        let id_input = serde_json::to_vec(&entries)?;
        Ok(Manifest {
            snapshot_id: Digest::of_bytes(&id_input).as_str().to_string(),
            root_name: root_name.into(),
            created_at: Utc::now(),
            entries,
        })
    }

    /// Digests referenced by this manifest (symlinks carry none).
    pub fn digests(&self) -> impl Iterator<Item = &Digest> {
        self.entries.iter().filter_map(|e| e.digest.as_ref())
    }

    /// Write the manifest as JSON (temp + rename, like other metadata).
    pub fn save(&self, path: &Path) -> Result<(), AssetsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a manifest from disk.
    pub fn load(path: &Path) -> Result<Manifest, AssetsError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AssetsError::ManifestNotFound(path.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
