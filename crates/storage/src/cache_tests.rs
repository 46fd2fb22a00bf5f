// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use indexmap::IndexMap;
use rn_core::{DataRoot, RunPath, SequentialRunIdGen};
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> RunStore {
    RunStore::open_with_id_gen(DataRoot::new(dir), SequentialRunIdGen::default()).unwrap()
}

fn append(store: &RunStore, id: &RunId, step: u64, loss: f64) {
    let mut fields = IndexMap::new();
    fields.insert("loss".to_string(), loss);
    store.append_event(id, Some(step), None, fields).unwrap();
}

#[test]
fn hit_returns_same_rows_without_reparse() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = store
        .create_run(&RunPath::parse("a").unwrap(), None)
        .unwrap()
        .meta
        .id;
    append(&store, &id, 1, 0.5);

    let cache = MetricsCache::default();
    let first = cache.rows(&store, &id).unwrap();
    let second = cache.rows(&store, &id).unwrap();
    assert_eq!(first.len(), 1);
    assert!(Arc::ptr_eq(&first, &second), "hit must not re-parse");
}

#[test]
fn growth_parses_only_the_tail() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = store
        .create_run(&RunPath::parse("a").unwrap(), None)
        .unwrap()
        .meta
        .id;
    append(&store, &id, 1, 0.5);

    let cache = MetricsCache::default();
    assert_eq!(cache.rows(&store, &id).unwrap().len(), 1);

    append(&store, &id, 2, 0.4);
    append(&store, &id, 3, 0.3);
    let rows = cache.rows(&store, &id).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].step, Some(3));
}

#[test]
fn shrink_invalidates_the_entry() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = store
        .create_run(&RunPath::parse("a").unwrap(), None)
        .unwrap()
        .meta
        .id;
    append(&store, &id, 1, 0.5);
    append(&store, &id, 2, 0.4);

    let cache = MetricsCache::default();
    assert_eq!(cache.rows(&store, &id).unwrap().len(), 2);

    // Replace the file with a shorter one
    let events_path = store.data_root().run(&id).events();
    let text = std::fs::read_to_string(&events_path).unwrap();
    let first_line = text.lines().next().unwrap();
    std::fs::write(&events_path, format!("{first_line}\n")).unwrap();

    let rows = cache.rows(&store, &id).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn capacity_evicts_least_recently_used() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let ids: Vec<RunId> = (0..3)
        .map(|i| {
            let id = store
                .create_run(&RunPath::parse(&format!("r{i}")).unwrap(), None)
                .unwrap()
                .meta
                .id;
            append(&store, &id, 1, 0.5);
            id
        })
        .collect();

    let cache = MetricsCache::new(2);
    for id in &ids {
        cache.rows(&store, id).unwrap();
    }
    assert_eq!(cache.len(), 2);
}

#[test]
fn unknown_run_is_an_error() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let cache = MetricsCache::default();
    let missing = RunId::new("20260101_120000_ffffff");
    assert!(matches!(
        cache.rows(&store, &missing),
        Err(StorageError::RunNotFound(_))
    ));
}
