// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! russh-backed SSH sessions.
//!
//! The library backend handles command execution and direct-tcpip
//! streams for every connection; host keys are validated against the
//! private known-hosts store inside the protocol handshake, so an
//! untrusted key aborts the connection before authentication.

use crate::controller::AuthMethod;
use crate::error::RemoteError;
use crate::known_hosts::{KnownHostsStore, Verification};
use crate::transport::{ConnectParams, Connector, ExecOutput, SshTransport, TransportStream};
use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client::{self, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::HostKeyProblem;

/// Protocol handler enforcing strict host-key policy.
struct StrictHostKeys {
    store: KnownHostsStore,
    host: String,
    port: u16,
    /// Set when the presented key was rejected, so the connector can
    /// surface the structured problem instead of a generic SSH error.
    problem: Arc<Mutex<Option<HostKeyProblem>>>,
}

impl client::Handler for StrictHostKeys {
    type Error = RemoteError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let key_type = server_public_key.algorithm().to_string();
        let openssh = server_public_key
            .to_openssh()
            .map_err(|e| RemoteError::Ssh(format!("unencodable server key: {e}")))?;
        let blob = openssh
            .split_whitespace()
            .nth(1)
            .unwrap_or(openssh.as_str());

        match self.store.verify(&self.host, self.port, &key_type, blob)? {
            Verification::Trusted => Ok(true),
            Verification::Problem(problem) => {
                warn!(
                    host = %self.host,
                    port = self.port,
                    reason = ?problem.reason,
                    fingerprint = %problem.fingerprint_sha256,
                    "host key rejected",
                );
                *self.problem.lock() = Some(problem);
                Ok(false)
            }
        }
    }
}

/// An authenticated russh session.
pub struct RusshSession {
    handle: tokio::sync::Mutex<Handle<StrictHostKeys>>,
}

#[async_trait]
impl SshTransport for RusshSession {
    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecOutput, RemoteError> {
        let fut = async {
            let mut channel = {
                let handle = self.handle.lock().await;
                handle.channel_open_session().await?
            };
            channel.exec(true, command).await?;

            let mut output = ExecOutput::default();
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { ref data }) => {
                        output.stdout.push_str(&String::from_utf8_lossy(data));
                    }
                    Some(ChannelMsg::ExtendedData { ref data, ext: 1 }) => {
                        output.stderr.push_str(&String::from_utf8_lossy(data));
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        output.exit_status = exit_status;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            debug!(command, status = output.exit_status, "remote exec finished");
            Ok::<_, RemoteError>(output)
        };

        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Exec {
                command: command.to_string(),
                stderr: format!("timed out after {}s", timeout.as_secs()),
            }),
        }
    }

    async fn is_alive(&self) -> bool {
        !self.handle.lock().await.is_closed()
    }

    async fn open_direct_tcpip(
        &self,
        remote_port: u16,
    ) -> Result<Box<dyn TransportStream>, RemoteError> {
        let handle = self.handle.lock().await;
        let channel = handle
            .channel_open_direct_tcpip("127.0.0.1", remote_port as u32, "127.0.0.1", 0)
            .await?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) {
        let handle = self.handle.lock().await;
        let _ = handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await;
    }
}

/// Production connector using russh with strict host keys.
pub struct RusshConnector {
    known_hosts: KnownHostsStore,
}

impl RusshConnector {
    pub fn new(known_hosts: KnownHostsStore) -> RusshConnector {
        RusshConnector { known_hosts }
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Arc<dyn SshTransport>, RemoteError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval: Some(Duration::from_secs(15)),
            ..client::Config::default()
        });

        let problem = Arc::new(Mutex::new(None));
        let handler = StrictHostKeys {
            store: self.known_hosts.clone(),
            host: params.host.clone(),
            port: params.port,
            problem: Arc::clone(&problem),
        };

        let addr = (params.host.as_str(), params.port);
        let connected =
            tokio::time::timeout(params.timeout, client::connect(config, addr, handler)).await;

        let mut handle = match connected {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                // A rejected host key surfaces through the handler slot
                if let Some(problem) = problem.lock().take() {
                    return Err(RemoteError::HostKey(Box::new(problem)));
                }
                return Err(e);
            }
            Err(_) => {
                return Err(RemoteError::Timeout {
                    host: params.host.clone(),
                    port: params.port,
                    seconds: params.timeout.as_secs(),
                })
            }
        };

        let authenticated = match &params.auth {
            AuthMethod::Password { password } => {
                handle
                    .authenticate_password(&params.username, password)
                    .await?
            }
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                let key = load_secret_key(key_path, passphrase.as_deref())
                    .map_err(|e| RemoteError::Ssh(format!("cannot load key: {e}")))?;
                handle
                    .authenticate_publickey(
                        &params.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), None),
                    )
                    .await?
            }
        };

        if !authenticated.success() {
            return Err(RemoteError::AuthFailed {
                host: params.host.clone(),
                user: params.username.clone(),
            });
        }

        Ok(Arc::new(RusshSession {
            handle: tokio::sync::Mutex::new(handle),
        }))
    }
}
