// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric event rows appended to a run's event log.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row of the event log: a timestamp, an optional step, an optional
/// stage label, and a map of metric name to value.
///
/// Field order is preserved so the JSONL on disk reads the way the caller
/// logged it. Timestamps are monotonic per writer; steps are monotonic per
/// writer but may be omitted or reset across stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub fields: IndexMap<String, f64>,
}

impl MetricEvent {
    pub fn new(ts: DateTime<Utc>, step: Option<u64>, stage: Option<String>) -> Self {
        Self {
            ts,
            step,
            stage,
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
