// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runicorn import` - unpack an exported archive into the data root.

use crate::CliError;
use anyhow::Context;
use clap::Args;
use rn_core::DataRoot;
use rn_storage::RunStore;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Archive produced by `runicorn export`
    #[arg(long, value_name = "FILE")]
    pub archive: PathBuf,

    /// Data root override
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,
}

pub fn run(args: ImportArgs) -> Result<(), CliError> {
    if !args.archive.is_file() {
        return Err(CliError::BadConfig(format!(
            "archive not found: {}",
            args.archive.display()
        )));
    }

    let root = DataRoot::new(rn_core::layout::resolve_data_root(args.data_root));
    std::fs::create_dir_all(root.path())
        .map_err(|e| CliError::BadConfig(format!("cannot create data root: {e}")))?;

    let imported = rn_assets::import_archive_from_file(&root, &args.archive)
        .with_context(|| format!("unpacking {}", args.archive.display()))
        .map_err(CliError::Fatal)?;

    // Reopening heals the index with the imported run rows
    let store = RunStore::open(root)
        .context("cannot open run store")
        .map_err(CliError::Fatal)?;
    store.heal_index();

    println!("imported {} run(s)", imported.len());
    for id in imported {
        println!("  {id}");
    }
    Ok(())
}
