// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use rn_core::{MetricMode, PrimaryMetric, RunPath, RunStatus};

fn fixture(id: &str, path: &str) -> (RunMeta, RunStatusFile) {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let meta = RunMeta {
        id: RunId::new(id),
        path: RunPath::parse(path).unwrap(),
        alias: None,
        created_at: now,
        hostname: "host".into(),
        username: None,
    };
    let status = RunStatusFile::new_running(1234, now);
    (meta, status)
}

#[test]
fn upsert_then_get_round_trips() {
    let index = Index::open_in_memory().unwrap();
    let (meta, status) = fixture("20260101_120000_a1b2c3", "cv/resnet50/baseline");
    index.upsert_run(&meta, &status, None).unwrap();

    let row = index.get_run(&meta.id).unwrap().unwrap();
    assert_eq!(row.path, "cv/resnet50/baseline");
    assert_eq!(row.status, "running");
    assert_eq!(row.deleted_at, None);
}

#[test]
fn upsert_twice_updates_in_place() {
    let index = Index::open_in_memory().unwrap();
    let (meta, mut status) = fixture("20260101_120000_a1b2c3", "cv/a");
    index.upsert_run(&meta, &status, None).unwrap();

    status.status = RunStatus::Finished;
    status.primary_metric = Some(PrimaryMetric {
        name: "loss".into(),
        mode: MetricMode::Min,
        best: Some(0.2),
        step: Some(4),
    });
    index.upsert_run(&meta, &status, None).unwrap();

    let row = index.get_run(&meta.id).unwrap().unwrap();
    assert_eq!(row.status, "finished");
    assert_eq!(row.primary_metric_best, Some(0.2));
    assert_eq!(row.primary_metric_step, Some(4));
}

#[test]
fn insert_event_writes_one_row_per_field() {
    let index = Index::open_in_memory().unwrap();
    let (meta, status) = fixture("20260101_120000_a1b2c3", "cv/a");
    index.upsert_run(&meta, &status, None).unwrap();

    let ts = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 1).unwrap();
    let event = MetricEvent::new(ts, Some(1), None)
        .with_field("loss", 0.5)
        .with_field("acc", 0.8);
    index.insert_event(&meta.id, &event).unwrap();

    let n = index
        .count("SELECT COUNT(*) FROM metrics WHERE run_id = ?1", &[&meta.id.as_str()])
        .unwrap();
    assert_eq!(n, 2);
}

#[test]
fn remove_run_deletes_metrics_too() {
    let index = Index::open_in_memory().unwrap();
    let (meta, status) = fixture("20260101_120000_a1b2c3", "cv/a");
    index.upsert_run(&meta, &status, None).unwrap();
    let ts = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 1).unwrap();
    index
        .insert_event(&meta.id, &MetricEvent::new(ts, None, None).with_field("x", 1.0))
        .unwrap();

    index.remove_run(&meta.id).unwrap();
    assert!(index.get_run(&meta.id).unwrap().is_none());
    let n = index.count("SELECT COUNT(*) FROM metrics", &[]).unwrap();
    assert_eq!(n, 0);
}

#[test]
fn mark_deleted_stamps_and_clears() {
    let index = Index::open_in_memory().unwrap();
    let (meta, status) = fixture("20260101_120000_a1b2c3", "cv/a");
    index.upsert_run(&meta, &status, None).unwrap();

    let at = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    index.mark_deleted(&meta.id, Some(at)).unwrap();
    assert!(index.get_run(&meta.id).unwrap().unwrap().deleted_at.is_some());

    index.mark_deleted(&meta.id, None).unwrap();
    assert!(index.get_run(&meta.id).unwrap().unwrap().deleted_at.is_none());
}

#[test]
fn freshness_compares_updated_at() {
    let index = Index::open_in_memory().unwrap();
    let (meta, status) = fixture("20260101_120000_a1b2c3", "cv/a");
    index.upsert_run(&meta, &status, None).unwrap();

    assert!(index.is_fresh(&meta.id, status.updated_at));
    let later = status.updated_at + chrono::Duration::seconds(5);
    assert!(!index.is_fresh(&meta.id, later));
    assert!(!index.is_fresh(&RunId::new("20260101_120000_ffffff"), status.updated_at));
}
