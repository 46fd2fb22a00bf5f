// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Implicit-context convenience layer.
//!
//! Scripts that do not want to thread a handle around can `init` once
//! and call the module-level functions; everything delegates to one
//! process-global [`Run`]. The explicit API remains the primary
//! surface; this is sugar on top of it.

use crate::{Run, RunConfig, SdkError};
use parking_lot::Mutex;
use rn_core::{MetricMode, RunStatus};
use std::sync::OnceLock;

fn slot() -> &'static Mutex<Option<Run>> {
    static ACTIVE: OnceLock<Mutex<Option<Run>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(None))
}

/// Errors specific to the implicit layer.
#[derive(Debug, thiserror::Error)]
pub enum ImplicitError {
    #[error("no active run; call init first")]
    NoActiveRun,
    #[error("a run is already active; finish it first")]
    AlreadyActive,
    #[error(transparent)]
    Sdk(#[from] SdkError),
}

/// Start the process-global run.
pub fn init(config: RunConfig) -> Result<(), ImplicitError> {
    let mut active = slot().lock();
    if active.is_some() {
        return Err(ImplicitError::AlreadyActive);
    }
    *active = Some(Run::start(config)?);
    Ok(())
}

/// Run id of the active run, if any.
pub fn active_run_id() -> Option<rn_core::RunId> {
    slot().lock().as_ref().map(|run| run.id().clone())
}

fn with_active<T>(f: impl FnOnce(&Run) -> T) -> Result<T, ImplicitError> {
    let active = slot().lock();
    match active.as_ref() {
        Some(run) => Ok(f(run)),
        None => Err(ImplicitError::NoActiveRun),
    }
}

/// Record one metric event on the active run.
pub fn log_metrics<I, K>(fields: I, step: Option<u64>) -> Result<(), ImplicitError>
where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
{
    with_active(|run| run.log_metrics(fields, step))
}

/// Append text to the active run's log.
pub fn log_text(text: impl AsRef<str>) -> Result<(), ImplicitError> {
    with_active(|run| run.log_text(text))
}

/// Label subsequent events with a stage.
pub fn set_stage(stage: Option<&str>) -> Result<(), ImplicitError> {
    with_active(|run| run.set_stage(stage))
}

/// Choose the primary metric on the active run.
pub fn set_primary_metric(name: &str, mode: MetricMode) -> Result<(), ImplicitError> {
    with_active(|run| run.set_primary_metric(name, mode))??;
    Ok(())
}

/// Finish and clear the active run.
pub fn finish(status: RunStatus) -> Result<(), ImplicitError> {
    let run = slot().lock().take().ok_or(ImplicitError::NoActiveRun)?;
    run.finish(status)?;
    Ok(())
}

#[cfg(test)]
#[path = "implicit_tests.rs"]
mod tests;
