// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::cas::BlobStore;
use crate::snapshot::{snapshot_workspace, SnapshotOptions};
use tempfile::tempdir;

fn write(path: &std::path::Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

#[test]
fn unreferenced_blob_is_deleted() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path());
    let blobs = BlobStore::new(&root);
    let (digest, _) = blobs.store_bytes(b"orphan").unwrap();

    let outcome = cleanup_orphaned_blobs(&root).unwrap();
    assert_eq!(outcome.deleted, 1);
    assert!(!blobs.contains(&digest));
}

#[test]
fn manifest_referenced_blobs_survive() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path());
    let blobs = BlobStore::new(&root);
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), b"code");
    let manifest = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();
    let (orphan, _) = blobs.store_bytes(b"orphan").unwrap();

    let outcome = cleanup_orphaned_blobs(&root).unwrap();
    assert_eq!(outcome.deleted, 1);
    assert!(!blobs.contains(&orphan));
    for digest in manifest.digests() {
        assert!(blobs.contains(digest), "reachable blob {digest} deleted");
    }
}

#[test]
fn run_asset_references_also_mark() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path());
    let blobs = BlobStore::new(&root);
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), b"code");

    let run_id = RunId::new("20260101_120000_a1b2c3");
    fs::create_dir_all(root.run_dir(&run_id)).unwrap();
    let manifest = snapshot_workspace(
        &root,
        &blobs,
        &ws,
        SnapshotOptions {
            ignore: None,
            run_id: Some(run_id),
        },
    )
    .unwrap();

    // Remove the published copy; the run's reference alone must keep the
    // blobs alive
    fs::remove_file(
        root.manifests_dir()
            .join(format!("{}.json", manifest.snapshot_id)),
    )
    .unwrap();

    let outcome = cleanup_orphaned_blobs(&root).unwrap();
    assert_eq!(outcome.deleted, 0);
    for digest in manifest.digests() {
        assert!(blobs.contains(digest));
    }
}

#[test]
fn empty_store_sweeps_cleanly() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path());
    let outcome = cleanup_orphaned_blobs(&root).unwrap();
    assert_eq!(outcome, GcOutcome::default());
}
