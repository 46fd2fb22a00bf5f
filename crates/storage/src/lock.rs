// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process advisory locking for multi-step run-directory updates.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// RAII guard over an exclusive advisory lock on a run's `.lock` file.
///
/// The lock is released on drop. Readers never take this lock; it only
/// serializes writers performing multi-step updates to `status.json` and
/// friends.
pub struct RunLock {
    file: File,
}

impl RunLock {
    /// Block until the lock is acquired.
    pub fn acquire(path: &Path) -> std::io::Result<RunLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(RunLock { file })
    }

    /// Try to acquire without blocking; `Ok(None)` when held elsewhere.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<RunLock>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(RunLock { file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
