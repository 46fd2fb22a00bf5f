// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native OpenSSH tunnel backend.
//!
//! First choice for port forwarding: spawn the system `ssh` with a
//! `-N -L` local forward, strict host-key checking, and our private
//! known-hosts file. Host-key failures from the subprocess are a
//! security decision, never a reason to fall back to another backend;
//! any other failure lets the caller try the library forward instead.

use crate::error::RemoteError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// How long we wait for the forwarded port to accept.
const BIND_WAIT: Duration = Duration::from_secs(3);

/// A running `ssh -N -L` subprocess.
pub struct OpenSshTunnel {
    child: Child,
    pub local_port: u16,
    pub remote_port: u16,
}

impl OpenSshTunnel {
    /// Kill the subprocess (dropping also kills it).
    pub async fn shutdown(mut self) {
        let _ = self.child.kill().await;
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Path of the ssh binary: `RUNICORN_SSH_PATH` or plain `ssh`.
pub fn ssh_binary() -> PathBuf {
    std::env::var("RUNICORN_SSH_PATH")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ssh"))
}

/// Build the argument vector for the forward invocation.
pub fn forward_args(
    host: &str,
    port: u16,
    username: &str,
    known_hosts: &Path,
    local_port: u16,
    remote_port: u16,
    key_path: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=yes".to_string(),
        "-o".to_string(),
        format!("UserKnownHostsFile={}", known_hosts.display()),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-N".to_string(),
        "-L".to_string(),
        format!("127.0.0.1:{local_port}:127.0.0.1:{remote_port}"),
        "-p".to_string(),
        port.to_string(),
    ];
    if let Some(key) = key_path {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args.push(format!("{username}@{host}"));
    args
}

/// Whether subprocess stderr indicates a host-key rejection.
pub fn is_host_key_failure(stderr: &str) -> bool {
    stderr.contains("Host key verification failed")
        || stderr.contains("REMOTE HOST IDENTIFICATION HAS CHANGED")
        || stderr.contains("No ED25519 host key is known")
        || stderr.contains("No RSA host key is known")
        || stderr.contains("No ECDSA host key is known")
}

/// Spawn the forward and wait for the local port to come up.
///
/// Only key/agent auth works here (`BatchMode=yes`); callers using
/// password auth go straight to the library backend.
pub async fn start_forward(
    host: &str,
    port: u16,
    username: &str,
    known_hosts: &Path,
    local_port: u16,
    remote_port: u16,
    key_path: Option<&Path>,
) -> Result<OpenSshTunnel, RemoteError> {
    let binary = ssh_binary();
    let args = forward_args(
        host,
        port,
        username,
        known_hosts,
        local_port,
        remote_port,
        key_path,
    );

    let mut child = Command::new(&binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RemoteError::Tunnel(format!("cannot spawn {}: {e}", binary.display())))?;

    // Poll until the forward accepts or the subprocess dies
    let deadline = tokio::time::Instant::now() + BIND_WAIT;
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            let stderr = stderr.trim().to_string();
            warn!(%status, stderr = %stderr, "openssh forward exited early");
            if is_host_key_failure(&stderr) {
                // Strict policy: surface as an SSH failure the controller
                // maps to a host-key problem via the library handshake;
                // never fall through to a laxer backend.
                return Err(RemoteError::Ssh(format!("host key rejected: {stderr}")));
            }
            return Err(RemoteError::Tunnel(format!(
                "ssh forward exited ({status}): {stderr}"
            )));
        }

        if tokio::net::TcpStream::connect(("127.0.0.1", local_port))
            .await
            .is_ok()
        {
            info!(local_port, remote_port, host, "openssh forward established");
            return Ok(OpenSshTunnel {
                child,
                local_port,
                remote_port,
            });
        }

        if tokio::time::Instant::now() >= deadline {
            let _ = child.kill().await;
            return Err(RemoteError::Tunnel(format!(
                "forwarded port 127.0.0.1:{local_port} did not come up within {}s",
                BIND_WAIT.as_secs()
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
#[path = "openssh_tests.rs"]
mod tests;
