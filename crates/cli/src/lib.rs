// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! runicorn - command-line entry point for the viewer and maintenance
//! commands.

pub mod commands;

use clap::{Parser, Subcommand};

/// Exit code for fatal startup errors.
pub const EXIT_FATAL: u8 = 1;

/// Exit code for invalid configuration.
pub const EXIT_BAD_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(
    name = "runicorn",
    version,
    about = "Local-first, zero-telemetry experiment tracker"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the read-only HTTP viewer
    Viewer(commands::viewer::ViewerArgs),
    /// Read or write the persistent user configuration
    Config(commands::config::ConfigArgs),
    /// Export runs under a prefix to a tar.gz archive
    Export(commands::export::ExportArgs),
    /// Import runs from a tar.gz archive
    Import(commands::import::ImportArgs),
    /// Permanently delete a run
    Delete(commands::delete::DeleteArgs),
}

/// Errors mapped to process exit codes.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration or arguments (exit 2)
    BadConfig(String),
    /// Fatal runtime failure (exit 1)
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> CliError {
        CliError::Fatal(e)
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::BadConfig(_) => EXIT_BAD_CONFIG,
            CliError::Fatal(_) => EXIT_FATAL,
        }
    }

    pub fn message(&self) -> String {
        match self {
            CliError::BadConfig(msg) => format!("invalid configuration: {msg}"),
            CliError::Fatal(e) => format!("{e:#}"),
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
