// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace snapshot → restore round trip (ignore rules, symlinks,
//! dedup).

use rn_assets::{restore_from_manifest, snapshot_workspace, BlobStore, SnapshotOptions};
use rn_core::{DataRoot, Digest};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

#[test]
fn snapshot_restore_matches_original_workspace() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path().join("data"));
    let blobs = BlobStore::new(&root);

    // A workspace with a small file, a large binary, a symlink, and
    // ignore rules carrying a negation
    let ws = dir.path().join("ws");
    write(&ws.join("a.py"), &vec![b'a'; 100]);
    write(&ws.join("data/b.bin"), &vec![0xAB; 10 * 1024 * 1024]);
    write(&ws.join(".rnignore"), b"*.log\n!keep.log\n");
    write(&ws.join("x.log"), b"scratch");
    write(&ws.join("keep.log"), b"important");
    #[cfg(unix)]
    std::os::unix::fs::symlink("a.py", ws.join("link")).unwrap();

    let manifest = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();

    let restored = dir.path().join("restored");
    restore_from_manifest(&manifest, &blobs, &restored).unwrap();

    // Byte-identical files; digests verify
    for rel in ["a.py", "data/b.bin", "keep.log"] {
        let original = fs::read(ws.join(rel)).unwrap();
        let round_tripped = fs::read(restored.join(rel)).unwrap();
        assert_eq!(original, round_tripped, "{rel}");
        let entry = manifest.entries.iter().find(|e| e.path == rel).unwrap();
        assert_eq!(
            Digest::of_bytes(&round_tripped),
            *entry.digest.as_ref().unwrap(),
            "{rel}"
        );
    }

    // Ignored file absent, negated file present
    assert!(!restored.join("x.log").exists());
    assert!(restored.join("keep.log").exists());

    // Symlink is a symlink with the same target
    #[cfg(unix)]
    {
        let meta = fs::symlink_metadata(restored.join("link")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(
            fs::read_link(restored.join("link")).unwrap(),
            Path::new("a.py")
        );
    }
}

#[test]
fn identical_inputs_produce_identical_snapshot_ids() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path().join("data"));
    let blobs = BlobStore::new(&root);
    let ws = dir.path().join("ws");
    write(&ws.join("train.py"), b"import torch\n");
    write(&ws.join("conf/model.yaml"), b"depth: 50\n");

    let first = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();
    let second = snapshot_workspace(&root, &blobs, &ws, SnapshotOptions::default()).unwrap();
    assert_eq!(first.snapshot_id, second.snapshot_id);
}

#[test]
fn duplicate_content_across_runs_shares_blobs() {
    let dir = tempdir().unwrap();
    let root = DataRoot::new(dir.path().join("data"));
    let blobs = BlobStore::new(&root);

    let ws1 = dir.path().join("ws1");
    let ws2 = dir.path().join("ws2");
    write(&ws1.join("shared.bin"), b"the same bytes");
    write(&ws2.join("copy.bin"), b"the same bytes");

    let m1 = snapshot_workspace(&root, &blobs, &ws1, SnapshotOptions::default()).unwrap();
    let m2 = snapshot_workspace(&root, &blobs, &ws2, SnapshotOptions::default()).unwrap();

    let d1 = m1.entries[0].digest.as_ref().unwrap();
    let d2 = m2.entries[0].digest.as_ref().unwrap();
    assert_eq!(d1, d2);
    // One physical file serves both manifests
    assert!(blobs.get_blob_path(d1).unwrap().is_file());
}
