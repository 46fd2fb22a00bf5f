// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background liveness sweep.
//!
//! A run whose writer died without calling `finish` stays `running` on
//! disk forever. The sweep visits running runs, checks the recorded pid
//! and the last write activity, and persists `stale` for runs failing
//! both checks. Terminal statuses are never overwritten.

use crate::store::{RunStore, StorageError};
use chrono::Utc;
use rn_core::{RunId, RunStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Sweep tunables.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Delay between sweeps.
    pub interval: Duration,
    /// How long a running run may go without writes before it is
    /// considered idle.
    pub idle_threshold: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(120),
        }
    }
}

/// Result of one sweep pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub marked_stale: Vec<RunId>,
}

/// Periodic stale-run detector.
pub struct StaleSweeper {
    store: Arc<RunStore>,
    config: SweepConfig,
}

impl StaleSweeper {
    pub fn new(store: Arc<RunStore>, config: SweepConfig) -> StaleSweeper {
        StaleSweeper { store, config }
    }

    /// Run a single pass over all runs.
    pub fn run_once(&self) -> Result<SweepOutcome, StorageError> {
        let mut outcome = SweepOutcome::default();
        for id in self.store.list_run_ids()? {
            let detail = match self.store.get_run(&id) {
                Ok(d) => d,
                Err(StorageError::RunNotFound(_)) => continue,
                Err(e) => {
                    warn!(run = %id, error = %e, "sweep: unreadable run skipped");
                    continue;
                }
            };
            if detail.status != RunStatus::Running {
                continue;
            }
            outcome.scanned += 1;

            if pid_alive(detail.pid) {
                continue;
            }
            let last = self.store.last_activity(&id)?;
            let idle = (Utc::now() - last)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if idle < self.config.idle_threshold {
                continue;
            }

            if self.store.mark_stale(&id)? {
                info!(run = %id, pid = detail.pid, idle_secs = idle.as_secs(), "run marked stale");
                outcome.marked_stale.push(id);
            }
        }
        Ok(outcome)
    }

    /// Loop forever at the configured interval (spawn as a tokio task).
    pub async fn run_loop(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let sweeper = StaleSweeper {
                store: Arc::clone(&self.store),
                config: self.config.clone(),
            };
            let result = tokio::task::spawn_blocking(move || sweeper.run_once()).await;
            match result {
                Ok(Ok(outcome)) if !outcome.marked_stale.is_empty() => {
                    info!(count = outcome.marked_stale.len(), "sweep pass complete");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "sweep pass failed"),
                Err(e) => warn!(error = %e, "sweep task panicked"),
            }
        }
    }
}

/// Best-effort liveness probe for a recorded pid.
///
/// On Linux `/proc/<pid>` existence is authoritative enough for our
/// purposes. Where procfs is unavailable the probe reports alive, which
/// errs on the side of never marking a live run stale.
fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        return proc_root.join(pid.to_string()).exists();
    }
    true
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
