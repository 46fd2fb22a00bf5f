// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;
use tempfile::tempdir;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let doc = Doc {
        name: "baseline".into(),
        count: 3,
    };
    write_json_atomic(&path, &doc).unwrap();
    assert_eq!(read_json::<Doc>(&path).unwrap(), Some(doc));
}

#[test]
fn missing_file_reads_as_none() {
    let dir = tempdir().unwrap();
    assert_eq!(read_json::<Doc>(&dir.path().join("nope.json")).unwrap(), None);
}

#[test]
fn write_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("doc.json");
    write_json_atomic(&path, &Doc { name: "x".into(), count: 0 }).unwrap();
    assert!(path.exists());
}

#[test]
fn no_tmp_file_left_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.json");
    write_json_atomic(&path, &Doc { name: "x".into(), count: 1 }).unwrap();
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn overwrite_replaces_whole_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.json");
    write_json_atomic(&path, &Doc { name: "long-name-first".into(), count: 1 }).unwrap();
    write_json_atomic(&path, &Doc { name: "x".into(), count: 2 }).unwrap();
    assert_eq!(
        read_json::<Doc>(&path).unwrap(),
        Some(Doc { name: "x".into(), count: 2 })
    );
}
