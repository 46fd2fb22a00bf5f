// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runicorn viewer` - start the HTTP + WebSocket service.

use crate::CliError;
use anyhow::Context;
use clap::Args;
use rn_core::DataRoot;
use rn_remote::{RemoteController, RemoteControllerConfig};
use rn_server::AppState;
use rn_storage::{RunStore, StaleSweeper, SweepConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Args)]
pub struct ViewerArgs {
    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Data root override (else RUNICORN_DIR, user config, platform default)
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,
}

pub fn run(args: ViewerArgs) -> Result<(), CliError> {
    let host: IpAddr = args
        .host
        .parse()
        .map_err(|_| CliError::BadConfig(format!("unparseable host: {:?}", args.host)))?;
    let addr = SocketAddr::new(host, args.port);

    let root = rn_core::layout::resolve_data_root(args.data_root);
    std::fs::create_dir_all(&root)
        .map_err(|e| CliError::BadConfig(format!("cannot create data root {}: {e}", root.display())))?;
    let root = DataRoot::new(root);

    let _log_guard = init_logging(&root)?;
    info!(data_root = %root.path().display(), %addr, "starting viewer");

    let runtime = tokio::runtime::Runtime::new()
        .context("cannot start async runtime")
        .map_err(CliError::Fatal)?;

    runtime.block_on(async move {
        let store = Arc::new(RunStore::open(root.clone()).context("cannot open run store")?);
        let remote = Arc::new(RemoteController::new(
            &root,
            RemoteControllerConfig::default(),
        ));
        let state = AppState::new(Arc::clone(&store), Arc::clone(&remote));

        let sweeper = StaleSweeper::new(Arc::clone(&store), SweepConfig::default());
        tokio::spawn(sweeper.run_loop());

        rn_server::serve(state, addr)
            .await
            .with_context(|| format!("cannot serve on {addr}"))?;
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

/// Env-filtered stderr logging plus a non-blocking file appender under
/// the data root.
fn init_logging(root: &DataRoot) -> Result<tracing_appender::non_blocking::WorkerGuard, CliError> {
    let filter = EnvFilter::try_from_env("RUNICORN_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender =
        tracing_appender::rolling::never(root.path(), "viewer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| CliError::BadConfig(format!("logging setup failed: {e}")))?;

    Ok(guard)
}
