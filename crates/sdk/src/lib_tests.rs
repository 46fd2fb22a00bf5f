// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rn_core::RunStatus;
use tempfile::tempdir;

fn config(dir: &std::path::Path, path: &str) -> RunConfig {
    RunConfig {
        data_root: Some(dir.to_path_buf()),
        ..RunConfig::new(path)
    }
}

#[test]
fn start_log_finish_round_trips() {
    let dir = tempdir().unwrap();
    let run = Run::start(config(dir.path(), "cv/resnet50/baseline")).unwrap();

    run.log_metrics([("loss", 0.5), ("acc", 0.8)], Some(1));
    run.log_metrics([("loss", 0.4)], Some(2));
    run.log_text("epoch 1 complete\n");
    run.finish(RunStatus::Finished).unwrap();

    let store = run.store.clone();
    let events = store.read_events(run.id()).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].fields["acc"], 0.8);
    assert_eq!(events[1].step, Some(2));

    let detail = store.get_run(run.id()).unwrap();
    assert_eq!(detail.status, RunStatus::Finished);

    let log = store.read_log_range(run.id(), None, None).unwrap();
    assert_eq!(log, b"epoch 1 complete\n");
}

#[test]
fn primary_metric_declared_up_front_is_tracked() {
    let dir = tempdir().unwrap();
    let run = Run::start(RunConfig {
        data_root: Some(dir.path().to_path_buf()),
        primary_metric: Some(("loss".into(), MetricMode::Min)),
        ..RunConfig::new("cv/a")
    })
    .unwrap();

    run.log_metrics([("loss", 0.5)], Some(1));
    run.log_metrics([("loss", 0.2)], Some(4));
    run.log_metrics([("loss", 0.9)], Some(5));
    run.finish(RunStatus::Finished).unwrap();

    let detail = run.store.get_run(run.id()).unwrap();
    let pm = detail.primary_metric.unwrap();
    assert_eq!(pm.best, Some(0.2));
    assert_eq!(pm.step, Some(4));
}

#[test]
fn stage_labels_are_attached() {
    let dir = tempdir().unwrap();
    let run = Run::start(config(dir.path(), "cv/a")).unwrap();
    run.set_stage(Some("train"));
    run.log_metrics([("loss", 0.5)], Some(1));
    run.set_stage(Some("val"));
    run.log_metrics([("loss", 0.6)], Some(1));
    run.set_stage(None);
    run.log_metrics([("loss", 0.4)], Some(2));
    run.finish(RunStatus::Finished).unwrap();

    let events = run.store.read_events(run.id()).unwrap();
    assert_eq!(events[0].stage.as_deref(), Some("train"));
    assert_eq!(events[1].stage.as_deref(), Some("val"));
    assert_eq!(events[2].stage, None);
}

#[test]
fn invalid_path_fails_start() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Run::start(config(dir.path(), "bad//path")),
        Err(SdkError::Path(_))
    ));
}

#[test]
fn double_finish_is_an_error() {
    let dir = tempdir().unwrap();
    let run = Run::start(config(dir.path(), "cv/a")).unwrap();
    run.finish(RunStatus::Finished).unwrap();
    assert!(matches!(
        run.finish(RunStatus::Finished),
        Err(SdkError::Finished)
    ));
}

#[test]
fn logging_after_finish_never_panics() {
    let dir = tempdir().unwrap();
    let run = Run::start(config(dir.path(), "cv/a")).unwrap();
    run.finish(RunStatus::Failed).unwrap();
    // Writer is gone; records drop silently
    run.log_metrics([("loss", 1.0)], Some(1));
    run.log_text("late line\n");
}

#[test]
fn images_land_in_media() {
    let dir = tempdir().unwrap();
    let run = Run::start(config(dir.path(), "cv/a")).unwrap();
    run.log_image("confusion.png", b"\x89PNG".to_vec(), Some(3));
    run.finish(RunStatus::Finished).unwrap();

    let media = run.store.data_root().run(run.id()).media_dir();
    assert!(media.join("3_confusion.png").exists());
}

#[test]
fn interrupted_status_is_preserved_verbatim() {
    let dir = tempdir().unwrap();
    let run = Run::start(config(dir.path(), "cv/a")).unwrap();
    run.finish(RunStatus::Interrupted).unwrap();
    assert_eq!(
        run.store.get_run(run.id()).unwrap().status,
        RunStatus::Interrupted
    );
}
