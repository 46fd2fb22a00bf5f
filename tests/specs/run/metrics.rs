// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downsampling behavior over a large run.

use crate::prelude::*;
use rn_storage::{MetricsCache, MetricsTable, XAxis};
use tempfile::tempdir;

#[test]
fn ten_thousand_steps_downsample_to_five_hundred() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/big");

    for step in 0..10_000u64 {
        store
            .append_event(&id, Some(step), None, loss(1.0 / (1.0 + step as f64)))
            .unwrap();
    }

    let cache = MetricsCache::default();
    let rows = cache.rows(&store, &id).unwrap();
    let table = MetricsTable::build(&rows, XAxis::Step, Some(500));

    assert_eq!(table.total, 10_000);
    assert_eq!(table.sampled, 500);
    assert_eq!(table.rows.first().unwrap()[0], Some(0.0));
    assert_eq!(table.rows.last().unwrap()[0], Some(9999.0));
    assert_eq!(table.last_step, Some(9999));

    // Monotonic step stays monotonic
    let steps: Vec<f64> = table.rows.iter().map(|r| r[0].unwrap()).collect();
    for pair in steps.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn cache_serves_incremental_appends() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/inc");
    let cache = MetricsCache::default();

    store.append_event(&id, Some(1), None, loss(0.9)).unwrap();
    assert_eq!(cache.rows(&store, &id).unwrap().len(), 1);

    for step in 2..=50u64 {
        store.append_event(&id, Some(step), None, loss(0.5)).unwrap();
    }
    assert_eq!(cache.rows(&store, &id).unwrap().len(), 50);
}

#[test]
fn step_order_is_append_order() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/order");
    for step in [1u64, 2, 3, 5, 8] {
        store.append_event(&id, Some(step), None, loss(0.1)).unwrap();
    }

    let events = store.read_events(&id).unwrap();
    let steps: Vec<u64> = events.iter().filter_map(|e| e.step).collect();
    assert_eq!(steps, vec![1, 2, 3, 5, 8]);
}
