// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary entry point: parse, dispatch, map errors to exit codes.

use clap::Parser;
use rn_cli::{commands, Cli, CliError, Commands};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Viewer(args) => commands::viewer::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Export(args) => commands::export::run(args),
        Commands::Import(args) => commands::import::run(args),
        Commands::Delete(args) => commands::delete::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error @ CliError::BadConfig(_)) => {
            eprintln!("error: {}", error.message());
            ExitCode::from(error.exit_code())
        }
        Err(error) => {
            eprintln!("error: {}", error.message());
            ExitCode::from(error.exit_code())
        }
    }
}
