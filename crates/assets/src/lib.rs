// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Assets engine: content-addressed blob storage, workspace snapshots
//! with `.rnignore` filtering, manifest-based restore, and orphan
//! collection.

mod archive;
mod cas;
mod error;
mod gc;
mod lock;
mod manifest;
mod restore;
mod rnignore;
mod snapshot;

pub use archive::{export_runs, export_runs_to_file, import_archive, import_archive_from_file};
pub use cas::BlobStore;
pub use error::AssetsError;
pub use gc::{cleanup_orphaned_blobs, GcOutcome};
pub use lock::AssetsLock;
pub use manifest::{Manifest, ManifestEntry};
pub use restore::restore_from_manifest;
pub use rnignore::IgnoreRules;
pub use snapshot::{archive_dir, archive_file, snapshot_workspace, SnapshotOptions};
