// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run metadata files.

use chrono::{DateTime, Utc};
use rn_core::{PrimaryMetric, RunId, RunPath, RunStatus};
use serde::{Deserialize, Serialize};

/// Contents of `meta.json`, written once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub id: RunId,
    pub path: RunPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub created_at: DateTime<Utc>,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Contents of `status.json`, rewritten atomically under the run lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusFile {
    pub status: RunStatus,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_metric: Option<PrimaryMetric>,
}

impl RunStatusFile {
    /// Initial status for a freshly created run.
    pub fn new_running(pid: u32, now: DateTime<Utc>) -> RunStatusFile {
        RunStatusFile {
            status: RunStatus::Running,
            pid,
            started_at: now,
            updated_at: now,
            primary_metric: None,
        }
    }
}

/// Soft-delete marker (`deleted.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedMarker {
    pub deleted_at: DateTime<Utc>,
}

/// Host identity recorded in `meta.json`.
pub fn host_fingerprint() -> (String, Option<String>) {
    let hostname = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string());
    let username = std::env::var("USER").ok().filter(|u| !u.is_empty());
    (hostname, username)
}

#[cfg(test)]
#[path = "run_dir_tests.rs"]
mod tests;
