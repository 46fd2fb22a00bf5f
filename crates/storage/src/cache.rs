// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide metrics cache.
//!
//! Each entry holds the parsed event rows for one run plus the file
//! offset consumed. A lookup stats `events.jsonl`: unchanged size is a
//! pure hit, growth triggers an incremental tail parse, and shrink or
//! replacement (size below the consumed offset) invalidates the entry.
//! Size is the key signal rather than mtime, which may not tick on rapid
//! appends on some filesystems.

use crate::event_log::read_events_from;
use crate::store::{RunStore, StorageError};
use lru::LruCache;
use parking_lot::Mutex;
use rn_core::{MetricEvent, RunId};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of runs kept parsed in memory.
pub const DEFAULT_CAPACITY: usize = 64;

struct CacheEntry {
    rows: Arc<Vec<MetricEvent>>,
    /// Offset one past the last complete record parsed.
    offset: u64,
    /// File size observed at last parse.
    file_size: u64,
}

/// LRU cache of parsed event logs.
pub struct MetricsCache {
    entries: Mutex<LruCache<RunId, CacheEntry>>,
}

impl MetricsCache {
    pub fn new(capacity: usize) -> MetricsCache {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        MetricsCache {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Parsed rows for a run, reading only what changed since last time.
    pub fn rows(
        &self,
        store: &RunStore,
        id: &RunId,
    ) -> Result<Arc<Vec<MetricEvent>>, StorageError> {
        let events_path = store.data_root().run(id).events();
        if !store.data_root().run_dir(id).is_dir() {
            return Err(StorageError::RunNotFound(id.clone()));
        }
        let file_size = std::fs::metadata(&events_path).map(|m| m.len()).unwrap_or(0);

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            if entry.file_size == file_size {
                return Ok(Arc::clone(&entry.rows));
            }
            if file_size >= entry.offset {
                // Grown (or same content, new tail): parse only the new bytes
                let (new_rows, offset) = read_events_from(&events_path, entry.offset)?;
                if !new_rows.is_empty() {
                    let mut rows = (*entry.rows).clone();
                    rows.extend(new_rows);
                    entry.rows = Arc::new(rows);
                    entry.offset = offset;
                }
                entry.file_size = file_size;
                return Ok(Arc::clone(&entry.rows));
            }
            // Shrunk or replaced: fall through to a full re-parse
            entries.pop(id);
        }

        let (rows, offset) = read_events_from(&events_path, 0)?;
        let rows = Arc::new(rows);
        entries.put(
            id.clone(),
            CacheEntry {
                rows: Arc::clone(&rows),
                offset,
                file_size,
            },
        );
        Ok(rows)
    }

    /// Drop one run's entry (e.g. after hard delete).
    pub fn invalidate(&self, id: &RunId) {
        self.entries.lock().pop(id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
