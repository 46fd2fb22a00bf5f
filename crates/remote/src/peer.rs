// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote peer viewer lifecycle.
//!
//! Composes a shell command that starts the runicorn viewer inside the
//! chosen environment, detached, bound to the remote loopback, with its
//! log in a per-connection temp file. Teardown is SIGTERM first, then
//! SIGKILL after a grace period.

use crate::discover::PythonEnv;
use crate::error::RemoteError;
use crate::transport::{SshTransport, DEFAULT_RPC_TIMEOUT};
use chrono::{DateTime, Utc};
use rn_core::ConnectionId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long we poll for the remote port to come up.
const START_WAIT: Duration = Duration::from_secs(3);

/// Grace period between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// A launched remote viewer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub pid: u32,
    pub remote_port: u16,
    pub log_path: String,
    pub env_name: String,
    pub started_at: DateTime<Utc>,
}

/// Remote log file for a connection's viewer.
pub fn peer_log_path(connection: &ConnectionId) -> String {
    format!("/tmp/runicorn-viewer-{connection}.log")
}

/// The detach-and-print-pid launch command.
pub fn launch_command(env: &PythonEnv, remote_port: u16, log_path: &str) -> String {
    format!(
        "nohup {python} -m runicorn viewer --host 127.0.0.1 --port {port} \
         > {log} 2>&1 & echo $!",
        python = env.python_path,
        port = remote_port,
        log = log_path,
    )
}

/// Remote health probe run inside the environment's interpreter.
pub fn health_probe_command(python: &str, remote_port: u16) -> String {
    format!(
        "{python} -c \"import urllib.request; \
         urllib.request.urlopen('http://127.0.0.1:{remote_port}/api/health', timeout=2)\"",
    )
}

/// Parse the `echo $!` pid line.
pub fn parse_launch_pid(stdout: &str) -> Option<u32> {
    stdout.lines().rev().find_map(|l| l.trim().parse().ok())
}

/// Start the viewer and wait for its port to answer.
pub async fn launch_viewer(
    transport: &Arc<dyn SshTransport>,
    connection: &ConnectionId,
    env: &PythonEnv,
    remote_port: u16,
) -> Result<PeerInfo, RemoteError> {
    let log_path = peer_log_path(connection);
    let command = launch_command(env, remote_port, &log_path);
    let output = transport.exec(&command, DEFAULT_RPC_TIMEOUT).await?;
    if !output.success() {
        return Err(RemoteError::ViewerStart(output.stderr_tail()));
    }
    let pid = parse_launch_pid(&output.stdout)
        .ok_or_else(|| RemoteError::ViewerStart(format!("no pid in: {}", output.stdout.trim())))?;

    // Poll the health endpoint until the port binds
    let deadline = tokio::time::Instant::now() + START_WAIT;
    let probe = health_probe_command(&env.python_path, remote_port);
    loop {
        let check = transport.exec(&probe, DEFAULT_RPC_TIMEOUT).await?;
        if check.success() {
            info!(pid, remote_port, conn = %connection, "remote viewer running");
            return Ok(PeerInfo {
                pid,
                remote_port,
                log_path,
                env_name: env.name.clone(),
                started_at: Utc::now(),
            });
        }
        if tokio::time::Instant::now() >= deadline {
            // Salvage the log tail for the error payload
            let tail = transport
                .exec(&format!("tail -c 4096 {log_path} 2>/dev/null"), DEFAULT_RPC_TIMEOUT)
                .await
                .map(|o| o.stdout)
                .unwrap_or_default();
            let _ = stop_viewer(transport, pid).await;
            return Err(RemoteError::ViewerStart(format!(
                "port {remote_port} never answered; log tail: {}",
                tail.trim()
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Whether the recorded pid is still alive on the remote host.
pub async fn peer_alive(transport: &Arc<dyn SshTransport>, pid: u32) -> bool {
    transport
        .exec(&format!("kill -0 {pid} 2>/dev/null"), DEFAULT_RPC_TIMEOUT)
        .await
        .map(|o| o.success())
        .unwrap_or(false)
}

/// SIGTERM, grace, then SIGKILL.
pub async fn stop_viewer(
    transport: &Arc<dyn SshTransport>,
    pid: u32,
) -> Result<(), RemoteError> {
    let term = transport
        .exec(&format!("kill -TERM {pid} 2>/dev/null"), DEFAULT_RPC_TIMEOUT)
        .await?;
    if !term.success() {
        // Already gone
        return Ok(());
    }

    let deadline = tokio::time::Instant::now() + KILL_GRACE;
    while tokio::time::Instant::now() < deadline {
        if !peer_alive(transport, pid).await {
            info!(pid, "remote viewer exited on SIGTERM");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    warn!(pid, "remote viewer ignored SIGTERM; sending SIGKILL");
    transport
        .exec(&format!("kill -KILL {pid} 2>/dev/null"), DEFAULT_RPC_TIMEOUT)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
