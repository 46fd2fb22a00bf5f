// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::RunStore;
use indexmap::IndexMap;
use rn_core::{DataRoot, RunPath, SequentialRunIdGen};
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> RunStore {
    RunStore::open_with_id_gen(DataRoot::new(dir), SequentialRunIdGen::default()).unwrap()
}

fn seed(store: &RunStore, paths: &[&str]) -> Vec<RunId> {
    paths
        .iter()
        .map(|p| {
            store
                .create_run(&RunPath::parse(p).unwrap(), None)
                .unwrap()
                .meta
                .id
        })
        .collect()
}

#[test]
fn list_runs_pages_with_stable_order() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    seed(&store, &["a", "b", "c", "d", "e"]);

    let query = RunQuery::new(&store);
    let page1 = query
        .list_runs(&ListFilter::default(), SortBy::CreatedAt, SortDir::Asc, 1, 2)
        .unwrap();
    assert_eq!(page1.total, 5);
    assert_eq!(page1.items.len(), 2);
    assert!(page1.has_next);
    assert!(!page1.has_prev);

    let page3 = query
        .list_runs(&ListFilter::default(), SortBy::CreatedAt, SortDir::Asc, 3, 2)
        .unwrap();
    assert_eq!(page3.items.len(), 1);
    assert!(!page3.has_next);
    assert!(page3.has_prev);

    // Creation order and id order coincide; ties break on id anyway
    let ids: Vec<&str> = page1.items.iter().map(|r| r.id.as_str()).collect();
    assert!(ids[0] < ids[1]);
}

#[test]
fn path_prefix_filter_is_segment_aligned() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    seed(&store, &["cv/resnet50/a", "cv/resnet50x/b", "cv/resnet50"]);

    let query = RunQuery::new(&store);
    let filter = ListFilter {
        path_prefix: Some("cv/resnet50".into()),
        ..ListFilter::default()
    };
    let page = query
        .list_runs(&filter, SortBy::CreatedAt, SortDir::Asc, 1, 50)
        .unwrap();
    let paths: Vec<&str> = page.items.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(page.total, 2);
    assert!(paths.contains(&"cv/resnet50/a"));
    assert!(paths.contains(&"cv/resnet50"));
    assert!(!paths.contains(&"cv/resnet50x/b"));
}

#[test]
fn status_filter_keeps_matching_runs() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let ids = seed(&store, &["a", "b"]);
    store.finish(&ids[0], rn_core::RunStatus::Finished).unwrap();

    let query = RunQuery::new(&store);
    let filter = ListFilter {
        status_in: vec![rn_core::RunStatus::Running],
        ..ListFilter::default()
    };
    let page = query
        .list_runs(&filter, SortBy::CreatedAt, SortDir::Asc, 1, 50)
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, ids[1]);
}

#[test]
fn deleted_runs_are_excluded_by_default() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let ids = seed(&store, &["a", "b"]);
    store.soft_delete(&ids[0]).unwrap();

    let query = RunQuery::new(&store);
    let page = query
        .list_runs(&ListFilter::default(), SortBy::CreatedAt, SortDir::Asc, 1, 50)
        .unwrap();
    assert_eq!(page.total, 1);

    let filter = ListFilter {
        include_deleted: true,
        ..ListFilter::default()
    };
    let page = query
        .list_runs(&filter, SortBy::CreatedAt, SortDir::Asc, 1, 50)
        .unwrap();
    assert_eq!(page.total, 2);
}

#[test]
fn sort_by_primary_metric_puts_missing_last() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let ids = seed(&store, &["a", "b", "c"]);

    for (id, loss) in [(&ids[0], 0.9), (&ids[1], 0.1)] {
        store.set_primary_metric(id, "loss", rn_core::MetricMode::Min).unwrap();
        let mut fields = IndexMap::new();
        fields.insert("loss".to_string(), loss);
        store.append_event(id, Some(1), None, fields).unwrap();
    }
    // ids[2] has no primary metric

    let query = RunQuery::new(&store);
    let page = query
        .list_runs(&ListFilter::default(), SortBy::PrimaryMetric, SortDir::Asc, 1, 50)
        .unwrap();
    let order: Vec<&RunId> = page.items.iter().map(|r| &r.id).collect();
    assert_eq!(order, vec![&ids[1], &ids[0], &ids[2]]);
}

#[test]
fn per_page_is_clamped_to_max() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    seed(&store, &["a"]);
    let query = RunQuery::new(&store);
    let page = query
        .list_runs(&ListFilter::default(), SortBy::CreatedAt, SortDir::Asc, 1, 100_000)
        .unwrap();
    assert_eq!(page.per_page, MAX_PAGE_SIZE);
}

#[test]
fn path_tree_aggregates_counts_and_running_flag() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let ids = seed(&store, &["cv/resnet50/a", "cv/resnet50/b", "nlp/bert"]);
    store.finish(&ids[2], rn_core::RunStatus::Finished).unwrap();

    let query = RunQuery::new(&store);
    let tree = query.path_tree().unwrap();
    assert_eq!(tree.len(), 2); // cv, nlp

    let cv = tree.iter().find(|n| n.name == "cv").unwrap();
    assert_eq!(cv.run_count, Some(2));
    assert_eq!(cv.has_running, Some(true));
    assert_eq!(cv.children.len(), 1);
    assert_eq!(cv.children[0].path, "cv/resnet50");

    let nlp = tree.iter().find(|n| n.name == "nlp").unwrap();
    assert_eq!(nlp.has_running, Some(false));
}

#[test]
fn soft_deleted_runs_do_not_count_in_tree() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let ids = seed(&store, &["cv/a", "cv/b"]);
    store.soft_delete(&ids[0]).unwrap();

    let query = RunQuery::new(&store);
    let tree = query.path_tree().unwrap();
    let cv = tree.iter().find(|n| n.name == "cv").unwrap();
    assert_eq!(cv.run_count, Some(1));
}

#[test]
fn soft_delete_prefix_flags_all_matches_once() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    seed(&store, &["cv/a", "cv/b", "nlp/c"]);

    let query = RunQuery::new(&store);
    assert_eq!(query.soft_delete_prefix("cv").unwrap(), 2);
    // Second pass finds nothing left to delete
    assert_eq!(query.soft_delete_prefix("cv").unwrap(), 0);

    let page = query
        .list_runs(&ListFilter::default(), SortBy::CreatedAt, SortDir::Asc, 1, 50)
        .unwrap();
    assert_eq!(page.total, 1);
}

#[test]
fn flat_paths_lists_distinct_paths() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    seed(&store, &["cv/a", "cv/a", "nlp/b"]);

    let query = RunQuery::new(&store);
    let flat = query.flat_paths(true).unwrap();
    assert_eq!(flat.len(), 2);
    let cv_a = flat.iter().find(|n| n.path == "cv/a").unwrap();
    assert_eq!(cv_a.run_count, Some(2));

    let bare = query.flat_paths(false).unwrap();
    assert!(bare[0].run_count.is_none());
}
