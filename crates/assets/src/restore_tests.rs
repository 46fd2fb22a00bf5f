// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::snapshot::{snapshot_workspace, SnapshotOptions};
use rn_core::DataRoot;
use tempfile::tempdir;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn write(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

fn snapshot_and_restore(ws: &Path, scratch: &Path) -> (Manifest, std::path::PathBuf) {
    let root = DataRoot::new(scratch.join("data"));
    let blobs = BlobStore::new(&root);
    let manifest = snapshot_workspace(&root, &blobs, ws, SnapshotOptions::default()).unwrap();
    let target = scratch.join("restored");
    restore_from_manifest(&manifest, &blobs, &target).unwrap();
    (manifest, target)
}

#[test]
fn workspace_round_trips_byte_identical() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), &vec![b'x'; 100]);
    write(&ws.join("data/b.bin"), &vec![42u8; 10 * 1024 * 1024]);
    write(&ws.join(".rnignore"), b"*.log\n!keep.log\n");
    write(&ws.join("x.log"), b"ignored");
    write(&ws.join("keep.log"), b"kept");
    #[cfg(unix)]
    std::os::unix::fs::symlink("a.py", ws.join("link")).unwrap();

    let (_, target) = snapshot_and_restore(&ws, dir.path());

    assert_eq!(fs::read(target.join("a.py")).unwrap(), vec![b'x'; 100]);
    assert_eq!(
        fs::read(target.join("data/b.bin")).unwrap(),
        vec![42u8; 10 * 1024 * 1024]
    );
    assert_eq!(fs::read(target.join("keep.log")).unwrap(), b"kept");
    assert!(!target.join("x.log").exists());
    #[cfg(unix)]
    {
        let meta = fs::symlink_metadata(target.join("link")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(
            fs::read_link(target.join("link")).unwrap().to_string_lossy(),
            "a.py"
        );
    }
}

#[cfg(unix)]
#[test]
fn mode_bits_survive_the_round_trip() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("ws");
    write(&ws.join("run.sh"), b"#!/bin/sh\n");
    fs::set_permissions(ws.join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();

    let (_, target) = snapshot_and_restore(&ws, dir.path());
    let mode = fs::metadata(target.join("run.sh")).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o755);
}

#[test]
fn restore_is_idempotent() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), b"code");

    let root = DataRoot::new(dir.path().join("data"));
    let blobs = BlobStore::new(&root);
    let manifest = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();
    let target = dir.path().join("restored");
    restore_from_manifest(&manifest, &blobs, &target).unwrap();
    restore_from_manifest(&manifest, &blobs, &target).unwrap();
    assert_eq!(fs::read(target.join("a.py")).unwrap(), b"code");
}

#[test]
fn drifted_target_file_is_replaced() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), b"original");

    let root = DataRoot::new(dir.path().join("data"));
    let blobs = BlobStore::new(&root);
    let manifest = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();
    let target = dir.path().join("restored");
    write(&target.join("a.py"), b"locally modified");

    restore_from_manifest(&manifest, &blobs, &target).unwrap();
    assert_eq!(fs::read(target.join("a.py")).unwrap(), b"original");
}

#[test]
fn missing_blob_fails_restore() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), b"code");

    let root = DataRoot::new(dir.path().join("data"));
    let blobs = BlobStore::new(&root);
    let manifest = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();

    // Simulate a lost blob
    let digest = manifest.entries[0].digest.clone().unwrap();
    fs::remove_file(blobs.blob_path(&digest)).unwrap();

    let err = restore_from_manifest(&manifest, &blobs, &dir.path().join("restored"));
    assert!(matches!(err, Err(AssetsError::BlobNotFound(_))));
}
