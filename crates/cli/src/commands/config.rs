// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runicorn config` - read/write the persistent user root.

use crate::CliError;
use clap::Args;
use rn_core::UserConfig;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Persist a new user data root
    #[arg(long, value_name = "PATH", conflicts_with = "show")]
    pub set_user_root: Option<PathBuf>,

    /// Print the current configuration
    #[arg(long)]
    pub show: bool,
}

pub fn run(args: ConfigArgs) -> Result<(), CliError> {
    let path = UserConfig::default_path()
        .map_err(|e| CliError::BadConfig(e.to_string()))?;

    if let Some(root) = args.set_user_root {
        if root.as_os_str().is_empty() {
            return Err(CliError::BadConfig("user root must not be empty".into()));
        }
        let mut config =
            UserConfig::load(&path).map_err(|e| CliError::BadConfig(e.to_string()))?;
        config.user_root = Some(root.clone());
        config
            .save(&path)
            .map_err(|e| CliError::Fatal(anyhow::anyhow!(e)))?;
        println!("user root set to {}", root.display());
        return Ok(());
    }

    // --show (also the default action)
    let config = UserConfig::load(&path).map_err(|e| CliError::BadConfig(e.to_string()))?;
    println!("config file: {}", path.display());
    match &config.user_root {
        Some(root) => println!("user_root = {}", root.display()),
        None => println!("user_root = (unset)"),
    }
    println!(
        "effective data root: {}",
        rn_core::layout::resolve_data_root(None).display()
    );
    Ok(())
}
