// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run log tailing with fan-out.
//!
//! One reader task per run polls `logs.txt` for growth and broadcasts
//! new byte ranges to every subscriber; frames carry absolute offsets
//! so a subscriber that snapshotted the file can discard the overlap.
//! Frames break on line boundaries: bytes after the last newline are
//! withheld until the next newline arrives, or flushed whole once the
//! tail has been idle for a couple of polls (a stalled progress bar
//! still reaches the client). Subscriber queues are bounded; a lagging
//! receiver loses the oldest frames (the WebSocket layer closes
//! persistent stragglers).

use parking_lot::Mutex;
use rn_core::{RunId, RunStatus};
use rn_storage::RunStore;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Poll cadence for file growth.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Polls without a newline before the withheld partial line is flushed.
const IDLE_FLUSH_TICKS: u32 = 2;

/// Bounded frames per subscriber.
const CHANNEL_CAPACITY: usize = 256;

/// One broadcast message.
#[derive(Debug, Clone)]
pub enum TailMsg {
    /// Bytes appended at `offset`.
    Data { offset: u64, bytes: Arc<Vec<u8>> },
    /// The run reached a terminal status; no more data will come.
    Finished,
}

/// Registry of live per-run tailers.
pub struct TailRegistry {
    store: Arc<RunStore>,
    tails: Mutex<HashMap<RunId, broadcast::Sender<TailMsg>>>,
}

impl TailRegistry {
    pub fn new(store: Arc<RunStore>) -> TailRegistry {
        TailRegistry {
            store,
            tails: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a run's log growth, starting the shared reader on
    /// first use.
    pub fn subscribe(&self, id: &RunId) -> broadcast::Receiver<TailMsg> {
        let mut tails = self.tails.lock();
        if let Some(tx) = tails.get(id) {
            if tx.receiver_count() > 0 {
                return tx.subscribe();
            }
            // Reader already exited; replace it below
            tails.remove(id);
        }

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        tails.insert(id.clone(), tx.clone());
        let store = Arc::clone(&self.store);
        let run_id = id.clone();
        tokio::spawn(reader_loop(store, run_id, tx));
        rx
    }
}

/// Poll the log file and broadcast growth until every subscriber is
/// gone or the run finishes.
///
/// Three positions track the file: `broadcast` (sent to subscribers),
/// `consumed` (read off disk), and the holdback buffer covering
/// `broadcast..consumed` while it lacks a terminating newline.
async fn reader_loop(store: Arc<RunStore>, id: RunId, tx: broadcast::Sender<TailMsg>) {
    let path = store.data_root().run(&id).logs();
    // Start at the current end; subscribers snapshot the prefix
    let mut consumed = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let mut broadcast = consumed;
    let mut pending: Vec<u8> = Vec::new();
    let mut idle_ticks = 0u32;
    debug!(run = %id, offset = broadcast, "log tail reader started");

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        if tx.receiver_count() == 0 {
            break;
        }

        let len = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                // Run directory may have been deleted mid-tail
                flush_pending(&tx, &mut pending, &mut broadcast, consumed);
                let _ = tx.send(TailMsg::Finished);
                break;
            }
        };

        if len < broadcast {
            // Truncated or replaced; drop the holdback, restart at the end
            pending.clear();
            consumed = len;
            broadcast = len;
            idle_ticks = 0;
            continue;
        }

        if len > consumed {
            match read_range(&path, consumed, len) {
                Ok(bytes) => {
                    pending.extend_from_slice(&bytes);
                    consumed = len;
                }
                Err(e) => {
                    warn!(run = %id, error = %e, "log tail read failed");
                }
            }
        }

        // Emit up to the last newline; hold the partial tail back
        if let Some(nl) = pending.iter().rposition(|&b| b == b'\n') {
            let complete: Vec<u8> = pending.drain(..=nl).collect();
            let frame = TailMsg::Data {
                offset: broadcast,
                bytes: Arc::new(complete),
            };
            broadcast += (nl + 1) as u64;
            idle_ticks = 0;
            let _ = tx.send(frame);
        } else if !pending.is_empty() {
            idle_ticks += 1;
            if idle_ticks >= IDLE_FLUSH_TICKS {
                flush_pending(&tx, &mut pending, &mut broadcast, consumed);
                idle_ticks = 0;
            }
        } else {
            idle_ticks = 0;
        }

        // Stop cleanly once the run is over and everything was flushed
        if pending.is_empty() && consumed == len {
            if let Ok(detail) = store.get_run(&id) {
                if detail.status != RunStatus::Running {
                    let _ = tx.send(TailMsg::Finished);
                    break;
                }
            }
        }
    }
    debug!(run = %id, "log tail reader stopped");
}

/// Send the withheld partial line as-is (idle flush or teardown).
fn flush_pending(
    tx: &broadcast::Sender<TailMsg>,
    pending: &mut Vec<u8>,
    broadcast: &mut u64,
    consumed: u64,
) {
    if pending.is_empty() {
        return;
    }
    let bytes = std::mem::take(pending);
    let frame = TailMsg::Data {
        offset: *broadcast,
        bytes: Arc::new(bytes),
    };
    *broadcast = consumed;
    let _ = tx.send(frame);
}

fn read_range(path: &std::path::Path, from: u64, to: u64) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(from))?;
    let mut buf = vec![0u8; (to - from) as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
#[path = "tail_tests.rs"]
mod tests;
