// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-controller error taxonomy.

use rn_core::ConnectionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable failure codes surfaced over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorCode {
    SshAuthFailed,
    ConnectionTimeout,
    EnvironmentNotFound,
    ViewerStartFailed,
    TunnelFailed,
}

/// Why a host key was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyReason {
    /// No record for this host in the store.
    Unknown,
    /// The presented key differs from the stored one.
    Changed,
}

/// Structured host-key confirmation request.
///
/// Surfaced as HTTP 409; the client must explicitly accept the key
/// before reconnecting. Never contains credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostKeyProblem {
    pub host: String,
    pub port: u16,
    pub key_type: String,
    pub fingerprint_sha256: String,
    /// OpenSSH-encoded public key (base64 blob).
    pub public_key: String,
    pub reason: HostKeyReason,
    /// The stored key's fingerprint when `reason == Changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// Errors from connections, tunnels, discovery, and peers.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("host key confirmation required for {}:{}", .0.host, .0.port)]
    HostKey(Box<HostKeyProblem>),
    #[error("ssh authentication failed for {user}@{host}")]
    AuthFailed { host: String, user: String },
    #[error("connection to {host}:{port} timed out after {seconds}s")]
    Timeout {
        host: String,
        port: u16,
        seconds: u64,
    },
    #[error("no such connection: {0}")]
    ConnectionNotFound(ConnectionId),
    #[error("no usable environment named {0:?} on the remote host")]
    EnvironmentNotFound(String),
    #[error("viewer failed to start: {0}")]
    ViewerStart(String),
    #[error("tunnel failed: {0}")]
    Tunnel(String),
    #[error("no free local port in {start}-{end}")]
    NoFreePort { start: u16, end: u16 },
    #[error("remote command failed ({command}): {stderr}")]
    Exec { command: String, stderr: String },
    #[error("ssh transport error: {0}")]
    Ssh(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// The wire code for this failure, when one applies.
    pub fn code(&self) -> Option<RemoteErrorCode> {
        match self {
            RemoteError::AuthFailed { .. } => Some(RemoteErrorCode::SshAuthFailed),
            RemoteError::Timeout { .. } => Some(RemoteErrorCode::ConnectionTimeout),
            RemoteError::EnvironmentNotFound(_) => Some(RemoteErrorCode::EnvironmentNotFound),
            RemoteError::ViewerStart(_) => Some(RemoteErrorCode::ViewerStartFailed),
            RemoteError::Tunnel(_) | RemoteError::NoFreePort { .. } => {
                Some(RemoteErrorCode::TunnelFailed)
            }
            _ => None,
        }
    }

    /// Suggested operator actions, surfaced alongside the error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            RemoteError::HostKey(problem) => vec![format!(
                "verify the fingerprint {} out of band, then accept the key",
                problem.fingerprint_sha256
            )],
            RemoteError::AuthFailed { user, host } => vec![
                format!("check credentials for {user}@{host}"),
                "confirm the key file or agent is available".to_string(),
            ],
            RemoteError::Timeout { host, .. } => vec![
                format!("check network reachability of {host}"),
                "raise the timeout for slow links".to_string(),
            ],
            RemoteError::EnvironmentNotFound(_) => vec![
                "install the runicorn package in the target environment".to_string(),
                "re-run environment discovery".to_string(),
            ],
            _ => Vec::new(),
        }
    }
}

impl From<russh::Error> for RemoteError {
    fn from(e: russh::Error) -> Self {
        RemoteError::Ssh(e.to_string())
    }
}
