// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runicorn delete` - permanently remove a run directory.

use crate::CliError;
use anyhow::Context;
use clap::Args;
use rn_core::{DataRoot, RunId};
use rn_storage::RunStore;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Id of the run to delete
    #[arg(long)]
    pub run_id: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,

    /// Data root override
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,
}

pub fn run(args: DeleteArgs) -> Result<(), CliError> {
    let id = RunId::validate(&args.run_id)
        .map_err(|e| CliError::BadConfig(e.to_string()))?;

    let root = DataRoot::new(rn_core::layout::resolve_data_root(args.data_root));
    let store = RunStore::open(root)
        .context("cannot open run store")
        .map_err(CliError::Fatal)?;

    let detail = store
        .get_run(&id)
        .map_err(|e| CliError::BadConfig(e.to_string()))?;

    if !args.force {
        print!(
            "permanently delete run {} ({})? [y/N] ",
            id, detail.meta.path
        );
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        let _ = std::io::stdin().read_line(&mut answer);
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("aborted");
            return Ok(());
        }
    }

    store
        .hard_delete(&id)
        .context("delete failed")
        .map_err(CliError::Fatal)?;
    println!("deleted {id}");
    Ok(())
}
