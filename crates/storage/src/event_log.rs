// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL metric event log.
//!
//! One JSON object per line, plain append. Each record is small enough
//! (≤ 4 KiB) to land in a single `write`, so a crash can leave at most one
//! incomplete trailing line; readers detect and skip it. Appends are
//! fsync-batched: a sync is issued every [`SYNC_THRESHOLD`] appends or
//! when [`SYNC_INTERVAL`] has elapsed, whichever comes first.

use rn_core::MetricEvent;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;

/// Appends between fsyncs.
const SYNC_THRESHOLD: u32 = 64;

/// Longest an appended record stays unsynced.
const SYNC_INTERVAL: Duration = Duration::from_millis(250);

/// Records larger than this lose the single-write atomicity guarantee.
const MAX_RECORD_BYTES: usize = 4096;

/// Append handle over one run's `events.jsonl`.
pub struct EventLog {
    file: File,
    path: PathBuf,
    unsynced: u32,
    last_sync: Instant,
}

impl EventLog {
    /// Open (or create) the event log for appending.
    pub fn open(path: &Path) -> io::Result<EventLog> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(EventLog {
            file,
            path: path.to_owned(),
            unsynced: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append one event as a single line.
    pub fn append(&mut self, event: &MetricEvent) -> io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        if line.len() > MAX_RECORD_BYTES {
            warn!(
                path = %self.path.display(),
                bytes = line.len(),
                "metric record exceeds single-write atomicity bound",
            );
        }
        self.file.write_all(&line)?;

        self.unsynced += 1;
        if self.unsynced >= SYNC_THRESHOLD || self.last_sync.elapsed() >= SYNC_INTERVAL {
            self.sync()?;
        }
        Ok(())
    }

    /// Force outstanding appends to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        if self.unsynced > 0 {
            self.file.sync_data()?;
            self.unsynced = 0;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

/// Parse events from `offset` onward.
///
/// Returns the parsed rows and the offset one past the last complete
/// record. A trailing line without a terminating newline, or whose JSON
/// fails to parse, is treated as a writer's in-flight append and skipped;
/// the returned offset stops before it so a later read retries it.
pub fn read_events_from(path: &Path, offset: u64) -> io::Result<(Vec<MetricEvent>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(offset))?;

    let mut events = Vec::new();
    let mut consumed = offset;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
            Err(e) => return Err(e),
        };

        if !line.ends_with('\n') {
            // Incomplete trailing record; leave it for the next read
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            consumed += bytes_read as u64;
            continue;
        }

        match serde_json::from_str::<MetricEvent>(trimmed) {
            Ok(event) => {
                events.push(event);
                consumed += bytes_read as u64;
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    offset = consumed,
                    error = %e,
                    "skipping unparseable event record",
                );
                // A corrupt interior line is fatal for the tail after it;
                // stop here rather than resynchronizing mid-file.
                break;
            }
        }
    }

    Ok((events, consumed))
}

/// Read every complete event in the log.
pub fn read_events(path: &Path) -> io::Result<Vec<MetricEvent>> {
    read_events_from(path, 0).map(|(events, _)| events)
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
