// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout rooted at the data root.
//!
//! ```text
//! <root>/
//!   runs/<run_id>/          meta.json status.json summary.json
//!                           events.jsonl logs.txt media/ assets/ .lock
//!   blobs/<aa>/<bb>/<hex>   content-addressed store
//!   index.db                derived SQLite index
//!   known_hosts             private host-key store
//! ```

use crate::config::UserConfig;
use crate::digest::Digest;
use crate::id::RunId;
use std::path::{Path, PathBuf};

/// Resolve the data root: explicit override > `RUNICORN_DIR` > persisted
/// user config > `~/.local/share/runicorn`.
pub fn resolve_data_root(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Ok(dir) = std::env::var("RUNICORN_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(root) = UserConfig::load_default().ok().and_then(|c| c.user_root) {
        return root;
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runicorn")
}

/// The data root and derived paths.
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn run_dir(&self, id: &RunId) -> PathBuf {
        self.runs_dir().join(id.as_str())
    }

    pub fn run(&self, id: &RunId) -> RunPaths {
        RunPaths::new(self.run_dir(id))
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        let (a, b, hex) = digest.shard();
        self.blobs_dir().join(a).join(b).join(hex)
    }

    /// Published workspace-snapshot manifests.
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.db")
    }

    pub fn known_hosts_path(&self) -> PathBuf {
        self.root.join("known_hosts")
    }

    /// Lock file guarding blob GC against concurrent snapshots.
    pub fn assets_lock_path(&self) -> PathBuf {
        self.root.join("blobs.lock")
    }
}

/// Paths of the files inside one run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    dir: PathBuf,
}

impl RunPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    pub fn status(&self) -> PathBuf {
        self.dir.join("status.json")
    }

    pub fn summary(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    pub fn events(&self) -> PathBuf {
        self.dir.join("events.jsonl")
    }

    pub fn logs(&self) -> PathBuf {
        self.dir.join("logs.txt")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.dir.join("media")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.dir.join("assets")
    }

    /// Manifest reference linking the run to a workspace snapshot.
    pub fn assets_manifest(&self) -> PathBuf {
        self.assets_dir().join("manifest.json")
    }

    pub fn lock(&self) -> PathBuf {
        self.dir.join(".lock")
    }

    /// Soft-delete marker.
    pub fn deleted_marker(&self) -> PathBuf {
        self.dir.join("deleted.json")
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
