// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived SQLite index over runs and metric points.
//!
//! The index exists for query performance only; the run directories are
//! the source of truth. A missing or stale index is rebuilt by scanning
//! `runs/`. Writes go through a single serialized connection; readers are
//! non-blocking thanks to WAL journaling.

use crate::run_dir::{RunMeta, RunStatusFile};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rn_core::{MetricEvent, RunId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

/// Errors from index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    alias TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status TEXT NOT NULL,
    pid INTEGER NOT NULL,
    primary_metric_name TEXT,
    primary_metric_mode TEXT,
    primary_metric_best REAL,
    primary_metric_step INTEGER,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_runs_path ON runs(path);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at);
CREATE INDEX IF NOT EXISTS idx_runs_deleted_at ON runs(deleted_at);
CREATE TABLE IF NOT EXISTS metrics (
    run_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    step INTEGER,
    stage TEXT
);
CREATE INDEX IF NOT EXISTS idx_metrics_run_name_step ON metrics(run_id, name, step);
";

/// Handle over the index database. Cheap to share behind an `Arc`.
pub struct Index {
    conn: Mutex<Connection>,
}

/// A run row as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedRun {
    pub id: RunId,
    pub path: String,
    pub alias: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub pid: u32,
    pub primary_metric_name: Option<String>,
    pub primary_metric_mode: Option<String>,
    pub primary_metric_best: Option<f64>,
    pub primary_metric_step: Option<u64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Index {
    /// Open (or create) the index at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Index, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Index {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory index for tests.
    pub fn open_in_memory() -> Result<Index, IndexError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Index {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a run row from its metadata files.
    pub fn upsert_run(
        &self,
        meta: &RunMeta,
        status: &RunStatusFile,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<(), IndexError> {
        let pm = status.primary_metric.as_ref();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO runs (id, path, alias, created_at, updated_at, status, pid,
                 primary_metric_name, primary_metric_mode, primary_metric_best,
                 primary_metric_step, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 path = excluded.path,
                 alias = excluded.alias,
                 updated_at = excluded.updated_at,
                 status = excluded.status,
                 pid = excluded.pid,
                 primary_metric_name = excluded.primary_metric_name,
                 primary_metric_mode = excluded.primary_metric_mode,
                 primary_metric_best = excluded.primary_metric_best,
                 primary_metric_step = excluded.primary_metric_step,
                 deleted_at = excluded.deleted_at",
            params![
                meta.id.as_str(),
                meta.path.as_str(),
                meta.alias,
                meta.created_at.to_rfc3339(),
                status.updated_at.to_rfc3339(),
                status.status.to_string(),
                status.pid,
                pm.map(|m| m.name.clone()),
                pm.map(|m| m.mode.to_string()),
                pm.and_then(|m| m.best),
                pm.and_then(|m| m.step),
                deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Append metric points for one event.
    pub fn insert_event(&self, run_id: &RunId, event: &MetricEvent) -> Result<(), IndexError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO metrics (run_id, ts, name, value, step, stage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (name, value) in &event.fields {
                stmt.execute(params![
                    run_id.as_str(),
                    event.ts.to_rfc3339(),
                    name,
                    value,
                    event.step,
                    event.stage,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Drop all metric points for a run (before a heal re-mirror).
    pub fn clear_metrics(&self, run_id: &RunId) -> Result<(), IndexError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM metrics WHERE run_id = ?1", [run_id.as_str()])?;
        Ok(())
    }

    /// Remove a run and its metric points.
    pub fn remove_run(&self, run_id: &RunId) -> Result<(), IndexError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM metrics WHERE run_id = ?1", [run_id.as_str()])?;
        tx.execute("DELETE FROM runs WHERE id = ?1", [run_id.as_str()])?;
        tx.commit()?;
        Ok(())
    }

    /// Stamp `deleted_at` on a run.
    pub fn mark_deleted(
        &self,
        run_id: &RunId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<(), IndexError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE runs SET deleted_at = ?2 WHERE id = ?1",
            params![run_id.as_str(), deleted_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Fetch one run row.
    pub fn get_run(&self, run_id: &RunId) -> Result<Option<IndexedRun>, IndexError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, path, alias, created_at, updated_at, status, pid,
                        primary_metric_name, primary_metric_mode, primary_metric_best,
                        primary_metric_step, deleted_at
                 FROM runs WHERE id = ?1",
                [run_id.as_str()],
                row_to_indexed_run,
            )
            .optional()?;
        Ok(row)
    }

    /// Run a caller-built query over `runs` rows.
    pub(crate) fn query_runs(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::types::ToSql],
    ) -> Result<Vec<IndexedRun>, IndexError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, row_to_indexed_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Scalar COUNT query helper.
    pub(crate) fn count(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::types::ToSql],
    ) -> Result<u64, IndexError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(sql, args, |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// All `(path, status, deleted)` triples, for tree aggregation.
    pub(crate) fn path_rows(&self) -> Result<Vec<(String, String, bool)>, IndexError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT path, status, deleted_at IS NOT NULL FROM runs")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, bool>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether the index knows this run at an `updated_at` at least as new
    /// as the files report.
    pub fn is_fresh(&self, run_id: &RunId, file_updated_at: DateTime<Utc>) -> bool {
        self.get_run(run_id)
            .ok()
            .flatten()
            .map(|row| row.updated_at >= file_updated_at)
            .unwrap_or(false)
    }
}

fn row_to_indexed_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedRun> {
    let parse_ts = |s: String| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default()
    };
    Ok(IndexedRun {
        id: RunId::new(row.get::<_, String>(0)?),
        path: row.get(1)?,
        alias: row.get(2)?,
        created_at: parse_ts(row.get(3)?),
        updated_at: parse_ts(row.get(4)?),
        status: row.get(5)?,
        pid: row.get(6)?,
        primary_metric_name: row.get(7)?,
        primary_metric_mode: row.get(8)?,
        primary_metric_best: row.get(9)?,
        primary_metric_step: row.get(10)?,
        deleted_at: row.get::<_, Option<String>>(11)?.map(parse_ts),
    })
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
