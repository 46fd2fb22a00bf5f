// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphan collection never eats reachable blobs.

use rn_assets::{cleanup_orphaned_blobs, snapshot_workspace, BlobStore, SnapshotOptions};
use rn_core::DataRoot;
use std::fs;
use tempfile::tempdir;

#[test]
fn sweep_removes_only_unreferenced_blobs() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path());
    let blobs = BlobStore::new(&root);

    let ws = dir.path().join("ws");
    fs::create_dir_all(&ws).unwrap();
    fs::write(ws.join("model.py"), b"reachable").unwrap();
    let manifest = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();

    let (orphan, _) = blobs.store_bytes(b"never referenced").unwrap();

    let outcome = cleanup_orphaned_blobs(&root).unwrap();
    assert_eq!(outcome.deleted, 1);
    assert!(!blobs.contains(&orphan));
    for digest in manifest.digests() {
        assert!(blobs.contains(digest));
    }

    // A second sweep is a no-op
    let outcome = cleanup_orphaned_blobs(&root).unwrap();
    assert_eq!(outcome.deleted, 0);
}
