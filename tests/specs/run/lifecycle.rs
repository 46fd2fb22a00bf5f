// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Create-and-list and finish semantics, end to end.

use crate::prelude::*;
use rn_core::{MetricMode, RunStatus};
use rn_storage::{ListFilter, RunQuery, SortBy, SortDir};
use tempfile::tempdir;

#[test]
fn create_append_then_list_shows_running_run() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/resnet50/baseline");

    for (step, value) in [(1u64, 0.5), (2, 0.4), (3, 0.3)] {
        store.append_event(&id, Some(step), None, loss(value)).unwrap();
    }

    let page = RunQuery::new(&store)
        .list_runs(&ListFilter::default(), SortBy::CreatedAt, SortDir::Asc, 1, 50)
        .unwrap();
    assert_eq!(page.total, 1);
    let item = &page.items[0];
    assert_eq!(item.id, id);
    assert_eq!(item.status, "running");
    assert!(item.primary_metric.is_none());
}

#[test]
fn primary_metric_best_updates_on_improvement() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/resnet50/baseline");

    for (step, value) in [(1u64, 0.5), (2, 0.4), (3, 0.3)] {
        store.append_event(&id, Some(step), None, loss(value)).unwrap();
    }
    store.set_primary_metric(&id, "loss", MetricMode::Min).unwrap();
    store.append_event(&id, Some(4), None, loss(0.2)).unwrap();

    let detail = store.get_run(&id).unwrap();
    let pm = detail.primary_metric.unwrap();
    assert_eq!(pm.best, Some(0.2));
    assert_eq!(pm.step, Some(4));
}

#[test]
fn finished_status_is_stable_across_readers() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/a");
    store.finish(&id, RunStatus::Finished).unwrap();

    // Every subsequent reader (and a fresh store) observes the same
    assert_eq!(store.get_run(&id).unwrap().status, RunStatus::Finished);
    let reopened = open_store(dir.path());
    assert_eq!(reopened.get_run(&id).unwrap().status, RunStatus::Finished);
}

#[test]
fn sdk_writer_feeds_the_query_surface() {
    let dir = tempdir().unwrap();

    let run = rn_sdk::Run::start(rn_sdk::RunConfig {
        data_root: Some(dir.path().to_path_buf()),
        primary_metric: Some(("loss".into(), MetricMode::Min)),
        ..rn_sdk::RunConfig::new("nlp/bert/finetune")
    })
    .unwrap();
    run.log_metrics([("loss", 0.7)], Some(1));
    run.log_metrics([("loss", 0.6)], Some(2));
    run.log_text("step 2 checkpointed\n");
    run.finish(RunStatus::Finished).unwrap();

    // The viewer-side store sees everything the SDK wrote
    let store = open_store(dir.path());
    let detail = store.get_run(run.id()).unwrap();
    assert_eq!(detail.status, RunStatus::Finished);
    assert_eq!(detail.primary_metric.unwrap().best, Some(0.6));
    assert_eq!(store.read_events(run.id()).unwrap().len(), 2);
}

#[test]
fn events_survive_a_torn_tail_write() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/a");
    store.append_event(&id, Some(1), None, loss(0.5)).unwrap();
    store.append_event(&id, Some(2), None, loss(0.4)).unwrap();

    // Crash mid-append: half a record with no newline
    let events_path = store.data_root().run(&id).events();
    use std::io::Write as _;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&events_path)
        .unwrap();
    file.write_all(b"{\"ts\":\"2026-").unwrap();
    drop(file);

    let events = store.read_events(&id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].step, Some(2));
}
