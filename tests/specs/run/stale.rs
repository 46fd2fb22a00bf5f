// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The liveness sweep marks abandoned runs stale.

use crate::prelude::*;
use rn_core::RunStatus;
use rn_storage::{read_json, write_json_atomic, RunStatusFile, StaleSweeper, SweepConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn killed_writer_goes_stale_after_idle_threshold() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/abandoned");
    store.append_event(&id, Some(1), None, loss(0.5)).unwrap();

    // Simulate the writer dying: its pid can no longer exist
    let status_path = store.data_root().run(&id).status();
    let mut status: RunStatusFile = read_json(&status_path).unwrap().unwrap();
    status.pid = u32::MAX;
    write_json_atomic(&status_path, &status).unwrap();

    // Idle threshold zero: the files' age qualifies immediately
    let sweeper = StaleSweeper::new(
        Arc::clone(&store),
        SweepConfig {
            interval: Duration::from_secs(30),
            idle_threshold: Duration::ZERO,
        },
    );
    let outcome = sweeper.run_once().unwrap();
    assert_eq!(outcome.marked_stale, vec![id.clone()]);
    assert_eq!(store.get_run(&id).unwrap().status, RunStatus::Stale);
}

#[test]
fn finish_beats_the_sweep() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let id = seed_run(&store, "cv/done");
    store.finish(&id, RunStatus::Interrupted).unwrap();

    let sweeper = StaleSweeper::new(
        Arc::clone(&store),
        SweepConfig {
            interval: Duration::from_secs(30),
            idle_threshold: Duration::ZERO,
        },
    );
    sweeper.run_once().unwrap();
    // The writer's terminal status is preserved verbatim
    assert_eq!(store.get_run(&id).unwrap().status, RunStatus::Interrupted);
}
