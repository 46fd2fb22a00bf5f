// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runicorn export` - pack runs under a prefix into a tar.gz.

use crate::CliError;
use anyhow::Context;
use clap::Args;
use rn_core::DataRoot;
use rn_storage::{RunQuery, RunStore};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Run-path prefix to export
    #[arg(long)]
    pub prefix: String,

    /// Output archive path (e.g. runs.tar.gz)
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Data root override
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,
}

pub fn run(args: ExportArgs) -> Result<(), CliError> {
    let root = DataRoot::new(rn_core::layout::resolve_data_root(args.data_root));
    let store = RunStore::open(root.clone())
        .context("cannot open run store")
        .map_err(CliError::Fatal)?;

    let runs = RunQuery::new(&store)
        .runs_under_prefix(&args.prefix)
        .context("listing runs failed")
        .map_err(CliError::Fatal)?;
    if runs.is_empty() {
        return Err(CliError::BadConfig(format!(
            "no runs under prefix {:?}",
            args.prefix
        )));
    }

    let ids: Vec<_> = runs.into_iter().map(|r| r.id).collect();
    let count = ids.len();
    rn_assets::export_runs_to_file(&root, &ids, &args.out)
        .with_context(|| format!("writing {}", args.out.display()))
        .map_err(CliError::Fatal)?;

    println!("exported {count} run(s) to {}", args.out.display());
    Ok(())
}
