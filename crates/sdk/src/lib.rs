// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Writer SDK for training code.
//!
//! `Run::start` returns an explicit handle; appends go through a
//! bounded background writer thread so the training loop never blocks
//! on disk and never sees a storage error. On I/O failure the writer
//! retries once, then logs at `warn` and drops the record. When the
//! queue is full the record is dropped immediately (and counted) rather
//! than stalling training.

pub mod implicit;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rn_core::{DataRoot, MetricMode, RunId, RunPath, RunStatus};
use rn_storage::{RunStore, StorageError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::warn;

/// Records buffered between the training loop and the writer thread.
const QUEUE_CAPACITY: usize = 8192;

/// Errors surfaced by `Run::start` and `finish` only; the logging
/// methods are infallible by design.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid run path: {0}")]
    Path(#[from] rn_core::PathError),
    #[error("run already finished")]
    Finished,
}

/// Options for starting a run.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Experiment path (`cv/resnet50/baseline`).
    pub path: String,
    pub alias: Option<String>,
    /// Data root override; resolution order otherwise matches the viewer.
    pub data_root: Option<PathBuf>,
    /// Primary metric declared up front.
    pub primary_metric: Option<(String, MetricMode)>,
}

impl RunConfig {
    pub fn new(path: impl Into<String>) -> RunConfig {
        RunConfig {
            path: path.into(),
            ..RunConfig::default()
        }
    }
}

enum WriterMsg {
    Event {
        step: Option<u64>,
        stage: Option<String>,
        fields: IndexMap<String, f64>,
    },
    Log(Vec<u8>),
    Image {
        key: String,
        bytes: Vec<u8>,
        step: Option<u64>,
    },
    Summary(serde_json::Map<String, serde_json::Value>),
    Shutdown,
}

/// Handle to an active run.
pub struct Run {
    id: RunId,
    store: Arc<RunStore>,
    tx: SyncSender<WriterMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stage: Mutex<Option<String>>,
    dropped: Arc<AtomicU64>,
    finished: Mutex<bool>,
}

impl Run {
    /// Create the run directory and start the background writer.
    pub fn start(config: RunConfig) -> Result<Run, SdkError> {
        let path = RunPath::parse(&config.path)?;
        let root = DataRoot::new(rn_core::layout::resolve_data_root(config.data_root.clone()));
        let store = Arc::new(RunStore::open(root)?);

        let detail = store.create_run(&path, config.alias.clone())?;
        let id = detail.meta.id.clone();
        if let Some((name, mode)) = &config.primary_metric {
            store.set_primary_metric(&id, name, *mode)?;
        }

        let (tx, rx) = sync_channel::<WriterMsg>(QUEUE_CAPACITY);
        let worker_store = Arc::clone(&store);
        let worker_id = id.clone();
        let worker = std::thread::Builder::new()
            .name(format!("rn-writer-{}", id))
            .spawn(move || writer_loop(worker_store, worker_id, rx))
            .map_err(StorageError::Io)?;

        Ok(Run {
            id,
            store,
            tx,
            worker: Mutex::new(Some(worker)),
            stage: Mutex::new(None),
            dropped: Arc::new(AtomicU64::new(0)),
            finished: Mutex::new(false),
        })
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Records dropped because the queue was full.
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Label subsequent metric events with a stage (e.g. `train`,
    /// `val`). `None` clears it.
    pub fn set_stage(&self, stage: Option<&str>) {
        *self.stage.lock() = stage.map(str::to_string);
    }

    /// Record one metric event. Never blocks, never fails.
    pub fn log_metrics<I, K>(&self, fields: I, step: Option<u64>)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let fields: IndexMap<String, f64> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if fields.is_empty() {
            return;
        }
        self.enqueue(WriterMsg::Event {
            step,
            stage: self.stage.lock().clone(),
            fields,
        });
    }

    /// Append text to the run log, as-is.
    pub fn log_text(&self, text: impl AsRef<str>) {
        self.enqueue(WriterMsg::Log(text.as_ref().as_bytes().to_vec()));
    }

    /// Append raw bytes to the run log (ANSI and progress bars welcome).
    pub fn log_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.enqueue(WriterMsg::Log(bytes.into()));
    }

    /// Store an image under the run's media directory.
    pub fn log_image(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>, step: Option<u64>) {
        self.enqueue(WriterMsg::Image {
            key: key.into(),
            bytes: bytes.into(),
            step,
        });
    }

    /// Choose the primary metric after the fact.
    pub fn set_primary_metric(&self, name: &str, mode: MetricMode) -> Result<(), SdkError> {
        Ok(self.store.set_primary_metric(&self.id, name, mode)?)
    }

    /// Merge keys into `summary.json`.
    pub fn update_summary(&self, patch: serde_json::Map<String, serde_json::Value>) {
        self.enqueue(WriterMsg::Summary(patch));
    }

    fn enqueue(&self, msg: WriterMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!(run = %self.id, dropped = n, "writer queue full; dropping records");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(run = %self.id, "writer thread gone; record dropped");
            }
        }
    }

    /// Drain the queue and write the terminal status.
    pub fn finish(&self, status: RunStatus) -> Result<(), SdkError> {
        {
            let mut finished = self.finished.lock();
            if *finished {
                return Err(SdkError::Finished);
            }
            *finished = true;
        }
        // Shutdown is sent blocking so every queued record lands first
        let _ = self.tx.send(WriterMsg::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        self.store.finish(&self.id, status)?;
        Ok(())
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        // Unfinished runs flush their queue but keep `running` status;
        // the liveness sweep will mark them stale if we died for good
        if !*self.finished.lock() {
            let _ = self.tx.send(WriterMsg::Shutdown);
            if let Some(worker) = self.worker.lock().take() {
                let _ = worker.join();
            }
        }
    }
}

/// Apply queued records; retry each failed write once, then drop it.
fn writer_loop(
    store: Arc<RunStore>,
    id: RunId,
    rx: std::sync::mpsc::Receiver<WriterMsg>,
) {
    while let Ok(msg) = rx.recv() {
        let result = match &msg {
            WriterMsg::Shutdown => break,
            WriterMsg::Event {
                step,
                stage,
                fields,
            } => apply_with_retry(|| {
                store.append_event(&id, *step, stage.clone(), fields.clone())
            }),
            WriterMsg::Log(bytes) => apply_with_retry(|| store.append_log(&id, bytes)),
            WriterMsg::Image { key, bytes, step } => {
                apply_with_retry(|| store.log_image(&id, key, bytes, *step).map(|_| ()))
            }
            WriterMsg::Summary(patch) => {
                apply_with_retry(|| store.update_summary(&id, patch.clone()))
            }
        };
        if let Err(e) = result {
            warn!(run = %id, error = %e, "write failed twice; record dropped");
        }
    }
}

fn apply_with_retry(
    mut op: impl FnMut() -> Result<(), StorageError>,
) -> Result<(), StorageError> {
    match op() {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(error = %first, "write failed; retrying once");
            std::thread::sleep(std::time::Duration::from_millis(50));
            op()
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
