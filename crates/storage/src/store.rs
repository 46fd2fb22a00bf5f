// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run store: top-level writer/reader API over the data root.
//!
//! Writers serialize per run through an in-process mutex around the event
//! log handle plus the cross-process `.lock` for multi-step status
//! updates. Readers never lock. Every write lands in the files first;
//! the index insert follows and is allowed to fail (the next rebuild
//! pass heals it).

use crate::atomic::{read_json, write_json_atomic};
use crate::event_log::{self, EventLog};
use crate::index::{Index, IndexError};
use crate::lock::RunLock;
use crate::run_dir::{host_fingerprint, DeletedMarker, RunMeta, RunStatusFile};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rn_core::{
    DataRoot, MetricEvent, MetricMode, PrimaryMetric, RunId, RunIdGen, RunPath, RunStatus,
    SystemClock, SystemRunIdGen,
};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors raised by the storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    #[error("run already exists: {0}")]
    AlreadyExists(RunId),
    #[error("run {0} has no readable status.json")]
    MissingStatus(RunId),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Tunables for the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Attempts before giving up on a colliding run id.
    pub create_retries: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { create_retries: 3 }
    }
}

/// Detailed view of one run (meta + status + soft-delete flag).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub meta: RunMeta,
    pub status: RunStatus,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_metric: Option<PrimaryMetric>,
    pub deleted: bool,
}

impl RunDetail {
    fn assemble(meta: RunMeta, status: RunStatusFile, deleted: bool) -> RunDetail {
        RunDetail {
            meta,
            status: status.status,
            pid: status.pid,
            started_at: status.started_at,
            updated_at: status.updated_at,
            primary_metric: status.primary_metric,
            deleted,
        }
    }
}

type IdGenFn = Arc<dyn Fn() -> RunId + Send + Sync>;

/// Shared handle over the data root. Cheap to clone via `Arc`.
pub struct RunStore {
    root: DataRoot,
    index: Index,
    logs: Mutex<HashMap<RunId, Arc<Mutex<EventLog>>>>,
    id_gen: IdGenFn,
    options: StoreOptions,
}

impl RunStore {
    /// Open the store, creating the layout and index as needed, and heal
    /// the index from the files.
    pub fn open(root: DataRoot) -> Result<RunStore, StorageError> {
        let gen = SystemRunIdGen::new(SystemClock);
        Self::open_with_id_gen(root, gen)
    }

    /// Open with a caller-supplied id generator (deterministic tests).
    pub fn open_with_id_gen(
        root: DataRoot,
        id_gen: impl RunIdGen,
    ) -> Result<RunStore, StorageError> {
        fs::create_dir_all(root.runs_dir())?;
        let index = Index::open(&root.index_path())?;
        let store = RunStore {
            root,
            index,
            logs: Mutex::new(HashMap::new()),
            id_gen: Arc::new(move || id_gen.next()),
            options: StoreOptions::default(),
        };
        store.heal_index();
        Ok(store)
    }

    pub fn data_root(&self) -> &DataRoot {
        &self.root
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    // ── writer operations ──────────────────────────────────────────────

    /// Create a run directory with initial metadata, retrying on id
    /// collision.
    pub fn create_run(
        &self,
        path: &RunPath,
        alias: Option<String>,
    ) -> Result<RunDetail, StorageError> {
        let mut last_collision = None;
        for _ in 0..self.options.create_retries.max(1) {
            let id = (self.id_gen)();
            let dir = self.root.run_dir(&id);
            match fs::create_dir_all(dir.parent().unwrap_or(&dir))
                .and_then(|()| fs::create_dir(&dir))
            {
                Ok(()) => {
                    return self.initialize_run(id, path.clone(), alias);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    last_collision = Some(id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::AlreadyExists(
            last_collision.unwrap_or_else(|| RunId::new("")),
        ))
    }

    fn initialize_run(
        &self,
        id: RunId,
        path: RunPath,
        alias: Option<String>,
    ) -> Result<RunDetail, StorageError> {
        let now = Utc::now();
        let (hostname, username) = host_fingerprint();
        let paths = self.root.run(&id);

        let meta = RunMeta {
            id: id.clone(),
            path,
            alias,
            created_at: now,
            hostname,
            username,
        };
        let status = RunStatusFile::new_running(std::process::id(), now);

        write_json_atomic(&paths.meta(), &meta)?;
        write_json_atomic(&paths.status(), &status)?;
        fs::File::create(paths.events())?;
        fs::File::create(paths.logs())?;

        if let Err(e) = self.index.upsert_run(&meta, &status, None) {
            warn!(run = %id, error = %e, "index write failed at create; will heal");
        }
        Ok(RunDetail::assemble(meta, status, false))
    }

    /// Append one metric event; updates the primary metric when improved.
    ///
    /// The event hits `events.jsonl` before any `status.json` update, so
    /// a reader can never observe the best value without its event.
    pub fn append_event(
        &self,
        id: &RunId,
        step: Option<u64>,
        stage: Option<String>,
        fields: IndexMap<String, f64>,
    ) -> Result<(), StorageError> {
        let handle = self.log_handle(id)?;
        let event = MetricEvent {
            ts: Utc::now(),
            step,
            stage,
            fields,
        };

        {
            let mut log = handle.lock();
            log.append(&event)?;
        }

        self.maybe_update_primary_metric(id, &event)?;

        if let Err(e) = self.index.insert_event(id, &event) {
            warn!(run = %id, error = %e, "index metric insert failed");
        }
        Ok(())
    }

    fn maybe_update_primary_metric(
        &self,
        id: &RunId,
        event: &MetricEvent,
    ) -> Result<(), StorageError> {
        let paths = self.root.run(id);
        let Some(status) = read_json::<RunStatusFile>(&paths.status())? else {
            return Err(StorageError::MissingStatus(id.clone()));
        };
        let Some(pm) = &status.primary_metric else {
            return Ok(());
        };
        let Some(&value) = event.fields.get(&pm.name) else {
            return Ok(());
        };
        if !pm.mode.improves(value, pm.best) {
            return Ok(());
        }

        // Re-read under the cross-process lock; another writer may have
        // recorded a better value since the check above.
        let _guard = RunLock::acquire(&paths.lock())?;
        let Some(mut status) = read_json::<RunStatusFile>(&paths.status())? else {
            return Err(StorageError::MissingStatus(id.clone()));
        };
        let updated = status
            .primary_metric
            .as_mut()
            .map(|pm| pm.observe(value, event.step))
            .unwrap_or(false);
        if updated {
            status.updated_at = Utc::now();
            write_json_atomic(&paths.status(), &status)?;
            self.refresh_index_row(id, &status);
        }
        Ok(())
    }

    /// Append raw bytes to the run's text log, as-is.
    pub fn append_log(&self, id: &RunId, bytes: &[u8]) -> Result<(), StorageError> {
        use std::io::Write as _;
        let paths = self.run_paths_checked(id)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths.logs())?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Store an image (or other media file) under `media/`.
    pub fn log_image(
        &self,
        id: &RunId,
        key: &str,
        bytes: &[u8],
        step: Option<u64>,
    ) -> Result<PathBuf, StorageError> {
        let paths = self.run_paths_checked(id)?;
        fs::create_dir_all(paths.media_dir())?;
        let name = match step {
            Some(step) => format!("{step}_{}", sanitize_key(key)),
            None => sanitize_key(key),
        };
        let target = paths.media_dir().join(name);
        fs::write(&target, bytes)?;
        Ok(target)
    }

    /// Choose the primary metric. Idempotent; an existing best for the
    /// same name and mode is kept.
    pub fn set_primary_metric(
        &self,
        id: &RunId,
        name: &str,
        mode: MetricMode,
    ) -> Result<(), StorageError> {
        let paths = self.run_paths_checked(id)?;
        let _guard = RunLock::acquire(&paths.lock())?;
        let Some(mut status) = read_json::<RunStatusFile>(&paths.status())? else {
            return Err(StorageError::MissingStatus(id.clone()));
        };
        let same = status
            .primary_metric
            .as_ref()
            .is_some_and(|pm| pm.name == name && pm.mode == mode);
        if !same {
            status.primary_metric = Some(PrimaryMetric::new(name, mode));
            status.updated_at = Utc::now();
            write_json_atomic(&paths.status(), &status)?;
            self.refresh_index_row(id, &status);
        }
        Ok(())
    }

    /// Shallow-merge `patch` into `summary.json`.
    pub fn update_summary(
        &self,
        id: &RunId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StorageError> {
        let paths = self.run_paths_checked(id)?;
        let _guard = RunLock::acquire(&paths.lock())?;
        let mut summary: serde_json::Map<String, serde_json::Value> =
            read_json(&paths.summary())?.unwrap_or_default();
        for (key, value) in patch {
            summary.insert(key, value);
        }
        write_json_atomic(&paths.summary(), &summary)?;
        Ok(())
    }

    /// Record a writer-chosen terminal status.
    pub fn finish(&self, id: &RunId, terminal: RunStatus) -> Result<(), StorageError> {
        debug_assert!(terminal.is_terminal());
        let paths = self.run_paths_checked(id)?;

        // Flush and drop the cached event log handle first
        if let Some(handle) = self.logs.lock().remove(id) {
            handle.lock().sync()?;
        }

        let _guard = RunLock::acquire(&paths.lock())?;
        let Some(mut status) = read_json::<RunStatusFile>(&paths.status())? else {
            return Err(StorageError::MissingStatus(id.clone()));
        };
        status.status = terminal;
        status.updated_at = Utc::now();
        write_json_atomic(&paths.status(), &status)?;
        self.refresh_index_row(id, &status);
        Ok(())
    }

    /// Move a still-running run to `stale` (liveness sweep outcome).
    pub fn mark_stale(&self, id: &RunId) -> Result<bool, StorageError> {
        let paths = self.run_paths_checked(id)?;
        let _guard = RunLock::acquire(&paths.lock())?;
        let Some(mut status) = read_json::<RunStatusFile>(&paths.status())? else {
            return Err(StorageError::MissingStatus(id.clone()));
        };
        if status.status != RunStatus::Running {
            return Ok(false);
        }
        status.status = RunStatus::Stale;
        status.updated_at = Utc::now();
        write_json_atomic(&paths.status(), &status)?;
        self.refresh_index_row(id, &status);
        Ok(true)
    }

    /// Soft delete: stamp the marker and exclude from listings.
    pub fn soft_delete(&self, id: &RunId) -> Result<(), StorageError> {
        let paths = self.run_paths_checked(id)?;
        let marker = DeletedMarker {
            deleted_at: Utc::now(),
        };
        write_json_atomic(&paths.deleted_marker(), &marker)?;
        if let Err(e) = self.index.mark_deleted(id, Some(marker.deleted_at)) {
            warn!(run = %id, error = %e, "index soft-delete failed");
        }
        Ok(())
    }

    /// Hard delete: remove the run directory and its index rows.
    pub fn hard_delete(&self, id: &RunId) -> Result<(), StorageError> {
        let paths = self.run_paths_checked(id)?;
        self.logs.lock().remove(id);
        fs::remove_dir_all(paths.dir())?;
        if let Err(e) = self.index.remove_run(id) {
            warn!(run = %id, error = %e, "index delete failed");
        }
        Ok(())
    }

    // ── reader operations ──────────────────────────────────────────────

    /// Detailed view of one run.
    pub fn get_run(&self, id: &RunId) -> Result<RunDetail, StorageError> {
        let paths = self.run_paths_checked(id)?;
        let meta: RunMeta = read_json(&paths.meta())?
            .ok_or_else(|| StorageError::RunNotFound(id.clone()))?;
        let status: RunStatusFile = read_json(&paths.status())?
            .ok_or_else(|| StorageError::MissingStatus(id.clone()))?;
        let deleted = paths.deleted_marker().exists();
        Ok(RunDetail::assemble(meta, status, deleted))
    }

    /// The run's summary document, if any.
    pub fn get_summary(
        &self,
        id: &RunId,
    ) -> Result<serde_json::Map<String, serde_json::Value>, StorageError> {
        let paths = self.run_paths_checked(id)?;
        Ok(read_json(&paths.summary())?.unwrap_or_default())
    }

    /// All complete events in the run's log.
    pub fn read_events(&self, id: &RunId) -> Result<Vec<MetricEvent>, StorageError> {
        let paths = self.run_paths_checked(id)?;
        Ok(event_log::read_events(&paths.events())?)
    }

    /// A byte range of the text log (`from..to`, clamped).
    pub fn read_log_range(
        &self,
        id: &RunId,
        from: Option<u64>,
        to: Option<u64>,
    ) -> Result<Vec<u8>, StorageError> {
        let paths = self.run_paths_checked(id)?;
        let mut file = match fs::File::open(paths.logs()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        let from = from.unwrap_or(0).min(len);
        let to = to.unwrap_or(len).clamp(from, len);
        file.seek(SeekFrom::Start(from))?;
        let mut buf = vec![0u8; (to - from) as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Ids of every run directory, sorted ascending (creation order).
    pub fn list_run_ids(&self) -> Result<Vec<RunId>, StorageError> {
        let mut ids = Vec::new();
        let entries = match fs::read_dir(self.root.runs_dir()) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = RunId::validate(name) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Most recent write activity across the run's files.
    ///
    /// Keyed off file mtimes rather than `status.json` alone: appends do
    /// not rewrite the status file.
    pub fn last_activity(&self, id: &RunId) -> Result<DateTime<Utc>, StorageError> {
        let paths = self.run_paths_checked(id)?;
        let mut newest = DateTime::<Utc>::MIN_UTC;
        for path in [paths.status(), paths.events(), paths.logs()] {
            if let Ok(meta) = fs::metadata(&path) {
                if let Ok(mtime) = meta.modified() {
                    newest = newest.max(DateTime::<Utc>::from(mtime));
                }
            }
        }
        Ok(newest)
    }

    // ── internals ──────────────────────────────────────────────────────

    fn run_paths_checked(&self, id: &RunId) -> Result<rn_core::RunPaths, StorageError> {
        let paths = self.root.run(id);
        if paths.dir().is_dir() {
            Ok(paths)
        } else {
            Err(StorageError::RunNotFound(id.clone()))
        }
    }

    fn log_handle(&self, id: &RunId) -> Result<Arc<Mutex<EventLog>>, StorageError> {
        let mut logs = self.logs.lock();
        if let Some(handle) = logs.get(id) {
            return Ok(Arc::clone(handle));
        }
        let paths = self.run_paths_checked(id)?;
        let handle = Arc::new(Mutex::new(EventLog::open(&paths.events())?));
        logs.insert(id.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    fn refresh_index_row(&self, id: &RunId, status: &RunStatusFile) {
        let paths = self.root.run(id);
        let meta: Option<RunMeta> = read_json(&paths.meta()).ok().flatten();
        let deleted_at = read_json::<DeletedMarker>(&paths.deleted_marker())
            .ok()
            .flatten()
            .map(|m| m.deleted_at);
        if let Some(meta) = meta {
            if let Err(e) = self.index.upsert_run(&meta, status, deleted_at) {
                warn!(run = %id, error = %e, "index refresh failed");
            }
        }
    }

    /// Bring the index in line with the files (missing or stale rows).
    pub fn heal_index(&self) {
        let ids = match self.list_run_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "index heal: cannot list runs");
                return;
            }
        };
        for id in ids {
            let paths = self.root.run(&id);
            let status: Option<RunStatusFile> = read_json(&paths.status()).ok().flatten();
            let Some(status) = status else { continue };
            if self.index.is_fresh(&id, status.updated_at) {
                continue;
            }
            self.refresh_index_row(&id, &status);
            // Re-mirror the metric rows from the event log
            if let Err(e) = self.index.clear_metrics(&id) {
                warn!(run = %id, error = %e, "index heal: metric clear failed");
                continue;
            }
            if let Ok(events) = event_log::read_events(&paths.events()) {
                for event in &events {
                    if let Err(e) = self.index.insert_event(&id, event) {
                        warn!(run = %id, error = %e, "index heal: metric insert failed");
                        break;
                    }
                }
            }
        }
    }
}

/// Replace characters unsafe in a media filename.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
