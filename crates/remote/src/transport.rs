// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam between the controller and concrete SSH backends.
//!
//! The controller only needs command execution, a liveness probe, and
//! direct-tcpip channels; everything else (auth, host keys, transport
//! negotiation) happens at connect time inside the [`Connector`].

use crate::error::RemoteError;
use async_trait::async_trait;
use std::time::Duration;

/// Default timeout for outward remote calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured output of a remote command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_status: u32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Tail of stderr bounded for error payloads (≤ 4 KiB).
    pub fn stderr_tail(&self) -> String {
        const MAX: usize = 4096;
        let s = self.stderr.trim_end();
        if s.len() <= MAX {
            s.to_string()
        } else {
            let cut = s.len() - MAX;
            let cut = s
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= cut)
                .unwrap_or(cut);
            s[cut..].to_string()
        }
    }
}

/// An established, authenticated SSH session.
#[async_trait]
pub trait SshTransport: Send + Sync {
    /// Run a command remotely, bounded by `timeout`.
    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecOutput, RemoteError>;

    /// Cheap aliveness check of the underlying transport.
    async fn is_alive(&self) -> bool;

    /// Open a raw byte stream to `127.0.0.1:port` on the remote side.
    async fn open_direct_tcpip(
        &self,
        remote_port: u16,
    ) -> Result<Box<dyn TransportStream>, RemoteError>;

    /// Tear the session down.
    async fn close(&self);
}

/// A bidirectional byte stream over the transport.
pub trait TransportStream:
    tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin
{
}

impl<T> TransportStream for T where T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {}

/// Parameters a connector needs to establish a session.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: crate::controller::AuthMethod,
    pub timeout: Duration,
}

/// Creates transports; the controller's seam for tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<std::sync::Arc<dyn SshTransport>, RemoteError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! In-memory transport for controller tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Scripted transport: canned replies per command substring.
    #[derive(Default)]
    pub struct FakeTransport {
        pub replies: Mutex<HashMap<String, ExecOutput>>,
        pub executed: Mutex<Vec<String>>,
        pub alive: AtomicBool,
    }

    impl FakeTransport {
        pub fn new() -> Arc<FakeTransport> {
            let t = FakeTransport {
                alive: AtomicBool::new(true),
                ..FakeTransport::default()
            };
            Arc::new(t)
        }

        pub fn reply(&self, needle: &str, stdout: &str) {
            self.replies.lock().insert(
                needle.to_string(),
                ExecOutput {
                    exit_status: 0,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            );
        }

        pub fn reply_failure(&self, needle: &str, stderr: &str) {
            self.replies.lock().insert(
                needle.to_string(),
                ExecOutput {
                    exit_status: 1,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                },
            );
        }

        pub fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SshTransport for Arc<FakeTransport> {
        async fn exec(
            &self,
            command: &str,
            _timeout: Duration,
        ) -> Result<ExecOutput, RemoteError> {
            self.executed.lock().push(command.to_string());
            let replies = self.replies.lock();
            for (needle, output) in replies.iter() {
                if command.contains(needle.as_str()) {
                    return Ok(output.clone());
                }
            }
            Ok(ExecOutput::default())
        }

        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn open_direct_tcpip(
            &self,
            _remote_port: u16,
        ) -> Result<Box<dyn TransportStream>, RemoteError> {
            Err(RemoteError::Tunnel("fake transport has no streams".into()))
        }

        async fn close(&self) {
            self.kill();
        }
    }

    /// Connector handing out a prepared fake transport.
    pub struct FakeConnector {
        pub transport: Arc<FakeTransport>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            _params: &ConnectParams,
        ) -> Result<Arc<dyn SshTransport>, RemoteError> {
            Ok(Arc::new(Arc::clone(&self.transport)))
        }
    }
}
