// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run lifecycle status and primary-metric tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a run.
///
/// Transitions: `Running` is the only initial state; `finish()` writes one
/// of the three writer-chosen terminal states; the liveness sweep moves
/// abandoned `Running` runs to `Stale`. `Stale` is not terminal: a writer
/// that resumes appending is allowed to move the run back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Writer process is (believed to be) alive and appending
    Running,
    /// Writer called finish with success
    Finished,
    /// Writer called finish reporting failure
    Failed,
    /// Writer was interrupted (e.g. Ctrl-C) and said so
    Interrupted,
    /// Writer vanished without writing a terminal status
    Stale,
}

impl RunStatus {
    /// Terminal states are never overwritten by the sweep.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Finished | RunStatus::Failed | RunStatus::Interrupted
        )
    }

    /// Parse the lowercase wire form.
    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "running" => Some(RunStatus::Running),
            "finished" => Some(RunStatus::Finished),
            "failed" => Some(RunStatus::Failed),
            "interrupted" => Some(RunStatus::Interrupted),
            "stale" => Some(RunStatus::Stale),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Finished => write!(f, "finished"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Interrupted => write!(f, "interrupted"),
            RunStatus::Stale => write!(f, "stale"),
        }
    }
}

/// Direction in which the primary metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricMode {
    Max,
    Min,
}

impl MetricMode {
    /// Whether `candidate` is strictly better than `best`.
    pub fn improves(self, candidate: f64, best: Option<f64>) -> bool {
        match best {
            None => true,
            Some(best) => match self {
                MetricMode::Max => candidate > best,
                MetricMode::Min => candidate < best,
            },
        }
    }
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricMode::Max => write!(f, "max"),
            MetricMode::Min => write!(f, "min"),
        }
    }
}

/// The one metric used to compute a run's "best value" summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryMetric {
    pub name: String,
    pub mode: MetricMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
}

impl PrimaryMetric {
    pub fn new(name: impl Into<String>, mode: MetricMode) -> Self {
        Self {
            name: name.into(),
            mode,
            best: None,
            step: None,
        }
    }

    /// Record `value` if it strictly improves on the current best.
    ///
    /// Returns true when the best was updated.
    pub fn observe(&mut self, value: f64, step: Option<u64>) -> bool {
        if self.mode.improves(value, self.best) {
            self.best = Some(value);
            self.step = step;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
