// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the behavioral specs.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use rn_core::{DataRoot, RunPath, SequentialRunIdGen};
use rn_storage::RunStore;
use std::path::Path;
use std::sync::Arc;

/// Open a store with deterministic run ids rooted in `dir`.
pub fn open_store(dir: &Path) -> Arc<RunStore> {
    Arc::new(
        RunStore::open_with_id_gen(DataRoot::new(dir), SequentialRunIdGen::default()).unwrap(),
    )
}

/// Create a run under `path` and return its id.
pub fn seed_run(store: &RunStore, path: &str) -> rn_core::RunId {
    store
        .create_run(&RunPath::parse(path).unwrap(), None)
        .unwrap()
        .meta
        .id
}

/// One-field metric map.
pub fn loss(value: f64) -> indexmap::IndexMap<String, f64> {
    let mut fields = indexmap::IndexMap::new();
    fields.insert("loss".to_string(), value);
    fields
}
