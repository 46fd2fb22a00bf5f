// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry and per-connection state machine.
//!
//! ```text
//! authenticating → connected → peer_starting → peer_running
//!                                  │                │
//!                                  │        (health fail) ⇄ degraded → failed
//!                                  └── disconnect → closing → closed
//! ```
//!
//! Execution always rides the library transport. Port forwarding tries
//! the native OpenSSH client first (key/agent auth only), then falls
//! back to the library's direct-tcpip forward. Host-key rejections
//! abort instead of falling back.

use crate::discover::{discover_environments, PythonEnv};
use crate::error::RemoteError;
use crate::health::{self, HealthReport, HEALTH_INTERVAL};
use crate::known_hosts::{HostKeyRecord, KnownHostsStore};
use crate::openssh::{self, OpenSshTunnel};
use crate::peer::{self, PeerInfo};
use crate::session::RusshConnector;
use crate::transport::{ConnectParams, Connector, SshTransport};
use crate::tunnel::{self, TunnelHandle, TunnelStats, LOCAL_PORT_RANGE};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rn_core::{ConnectionId, DataRoot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How the connection authenticates.
#[derive(Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    Password { password: String },
    Key {
        key_path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

// Credentials must never reach logs or error payloads
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { .. } => write!(f, "Password(***)"),
            AuthMethod::Key { key_path, .. } => write!(f, "Key({})", key_path.display()),
        }
    }
}

/// Connection request from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
}

fn default_ssh_port() -> u16 {
    22
}

/// Observable state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Authenticating,
    Connected,
    PeerStarting,
    PeerRunning,
    Degraded,
    Failed,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::PeerStarting => "peer_starting",
            ConnectionState::PeerRunning => "peer_running",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Failed => "failed",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Controller tunables.
#[derive(Debug, Clone)]
pub struct RemoteControllerConfig {
    pub connect_timeout: Duration,
    pub local_port_range: (u16, u16),
    pub health_interval: Duration,
    /// Reconnect backoff schedule for transient SSH loss.
    pub reconnect_backoff: Vec<Duration>,
}

impl Default for RemoteControllerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            local_port_range: LOCAL_PORT_RANGE,
            health_interval: HEALTH_INTERVAL,
            reconnect_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

/// Either tunnel backend, behind one shutdown surface.
enum ActiveTunnel {
    Lib(TunnelHandle),
    OpenSsh(OpenSshTunnel),
}

impl ActiveTunnel {
    fn local_port(&self) -> u16 {
        match self {
            ActiveTunnel::Lib(t) => t.local_port,
            ActiveTunnel::OpenSsh(t) => t.local_port,
        }
    }

    fn stats(&self) -> Option<TunnelStats> {
        match self {
            ActiveTunnel::Lib(t) => Some(t.stats()),
            ActiveTunnel::OpenSsh(_) => None,
        }
    }

    async fn shutdown(self) {
        match self {
            ActiveTunnel::Lib(t) => t.shutdown(),
            ActiveTunnel::OpenSsh(t) => t.shutdown().await,
        }
    }
}

struct ConnectionInner {
    id: ConnectionId,
    host: String,
    port: u16,
    username: String,
    auth: AuthMethod,
    connected_at: DateTime<Utc>,
    state: Mutex<ConnectionState>,
    transport: tokio::sync::RwLock<Arc<dyn SshTransport>>,
    peer: Mutex<Option<PeerInfo>>,
    env: Mutex<Option<PythonEnv>>,
    tunnel: tokio::sync::Mutex<Option<ActiveTunnel>>,
    last_heartbeat: Mutex<DateTime<Utc>>,
    last_health: Mutex<Option<HealthReport>>,
    monitor_stop: CancellationToken,
}

impl ConnectionInner {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

/// Public listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_url: Option<String>,
}

/// Viewer lifecycle report.
#[derive(Debug, Clone, Serialize)]
pub struct ViewerStatus {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelStats>,
}

/// Owns every remote connection.
pub struct RemoteController {
    known_hosts: KnownHostsStore,
    connector: Arc<dyn Connector>,
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionInner>>>,
    config: RemoteControllerConfig,
}

impl RemoteController {
    /// Production controller rooted at the data root's known-hosts file.
    pub fn new(root: &DataRoot, config: RemoteControllerConfig) -> RemoteController {
        let known_hosts = KnownHostsStore::new(root.known_hosts_path());
        let connector = Arc::new(RusshConnector::new(known_hosts.clone()));
        Self::with_connector(known_hosts, connector, config)
    }

    /// Controller with an injected connector (tests).
    pub fn with_connector(
        known_hosts: KnownHostsStore,
        connector: Arc<dyn Connector>,
        config: RemoteControllerConfig,
    ) -> RemoteController {
        RemoteController {
            known_hosts,
            connector,
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn known_hosts(&self) -> &KnownHostsStore {
        &self.known_hosts
    }

    /// Establish a connection; host-key problems surface as
    /// [`RemoteError::HostKey`].
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectionId, RemoteError> {
        let params = ConnectParams {
            host: request.host.clone(),
            port: request.port,
            username: request.username.clone(),
            auth: request.auth.clone(),
            timeout: self.config.connect_timeout,
        };
        let transport = self.connector.connect(&params).await?;

        let id = ConnectionId::new(format!("conn-{}", uuid::Uuid::new_v4().simple()));
        let now = Utc::now();
        let inner = Arc::new(ConnectionInner {
            id: id.clone(),
            host: request.host,
            port: request.port,
            username: request.username,
            auth: request.auth,
            connected_at: now,
            state: Mutex::new(ConnectionState::Connected),
            transport: tokio::sync::RwLock::new(transport),
            peer: Mutex::new(None),
            env: Mutex::new(None),
            tunnel: tokio::sync::Mutex::new(None),
            last_heartbeat: Mutex::new(now),
            last_health: Mutex::new(None),
            monitor_stop: CancellationToken::new(),
        });

        self.connections.write().insert(id.clone(), Arc::clone(&inner));
        self.spawn_monitor(inner);
        info!(connection = %id, "remote connection established");
        Ok(id)
    }

    /// All live connections.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .read()
            .values()
            .map(|c| self.info(c))
            .collect();
        infos.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        infos
    }

    fn info(&self, inner: &ConnectionInner) -> ConnectionInfo {
        let viewer_url = inner
            .tunnel
            .try_lock()
            .ok()
            .and_then(|t| t.as_ref().map(|t| viewer_url(t.local_port())));
        ConnectionInfo {
            connection_id: inner.id.clone(),
            host: inner.host.clone(),
            port: inner.port,
            username: inner.username.clone(),
            state: inner.state(),
            connected_at: inner.connected_at,
            last_heartbeat: *inner.last_heartbeat.lock(),
            viewer_url,
        }
    }

    fn get(&self, id: &ConnectionId) -> Result<Arc<ConnectionInner>, RemoteError> {
        self.connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::ConnectionNotFound(id.clone()))
    }

    /// Tear a connection down, transitively closing tunnel and peer.
    pub async fn disconnect(
        &self,
        id: &ConnectionId,
        cleanup_peer: bool,
    ) -> Result<(), RemoteError> {
        let inner = self.get(id)?;
        inner.set_state(ConnectionState::Closing);
        inner.monitor_stop.cancel();

        if let Some(tunnel) = inner.tunnel.lock().await.take() {
            tunnel.shutdown().await;
        }
        let peer = inner.peer.lock().take();
        if cleanup_peer {
            if let Some(peer) = peer {
                let transport = inner.transport.read().await.clone();
                if let Err(e) = peer::stop_viewer(&transport, peer.pid).await {
                    warn!(connection = %id, error = %e, "peer teardown failed");
                }
            }
        }
        inner.transport.read().await.close().await;

        inner.set_state(ConnectionState::Closed);
        self.connections.write().remove(id);
        info!(connection = %id, "remote connection closed");
        Ok(())
    }

    /// Close every connection (server shutdown).
    pub async fn shutdown(&self) {
        let ids: Vec<ConnectionId> = self.connections.read().keys().cloned().collect();
        for id in ids {
            let _ = self.disconnect(&id, true).await;
        }
    }

    /// Discover usable remote environments.
    pub async fn environments(&self, id: &ConnectionId) -> Result<Vec<PythonEnv>, RemoteError> {
        let inner = self.get(id)?;
        let transport = inner.transport.read().await.clone();
        discover_environments(&transport).await
    }

    /// Launch the peer viewer in `env_name` and forward it locally.
    pub async fn start_viewer(
        &self,
        id: &ConnectionId,
        env_name: &str,
    ) -> Result<ViewerStatus, RemoteError> {
        let inner = self.get(id)?;
        let transport = inner.transport.read().await.clone();

        let envs = discover_environments(&transport).await?;
        let env = envs
            .into_iter()
            .find(|e| e.name == env_name)
            .ok_or_else(|| RemoteError::EnvironmentNotFound(env_name.to_string()))?;

        inner.set_state(ConnectionState::PeerStarting);
        let remote_port: u16 = rand::rng().random_range(18000..19000);

        let peer = match peer::launch_viewer(&transport, &inner.id, &env, remote_port).await {
            Ok(peer) => peer,
            Err(e) => {
                inner.set_state(ConnectionState::Connected);
                return Err(e);
            }
        };

        let tunnel = match self.establish_tunnel(&inner, &transport, remote_port).await {
            Ok(tunnel) => tunnel,
            Err(e) => {
                let _ = peer::stop_viewer(&transport, peer.pid).await;
                inner.set_state(ConnectionState::Connected);
                return Err(e);
            }
        };

        let local_port = tunnel.local_port();
        *inner.tunnel.lock().await = Some(tunnel);
        *inner.peer.lock() = Some(peer.clone());
        *inner.env.lock() = Some(env);
        inner.set_state(ConnectionState::PeerRunning);

        let tunnel_guard = inner.tunnel.lock().await;
        let status = ViewerStatus {
            state: ConnectionState::PeerRunning,
            viewer_url: Some(viewer_url(local_port)),
            peer: Some(peer),
            tunnel: tunnel_guard.as_ref().and_then(|t| t.stats()),
        };
        Ok(status)
    }

    /// Backend chain: OpenSSH subprocess first (key auth only), then the
    /// library forward. Host-key errors abort the chain.
    async fn establish_tunnel(
        &self,
        inner: &ConnectionInner,
        transport: &Arc<dyn SshTransport>,
        remote_port: u16,
    ) -> Result<ActiveTunnel, RemoteError> {
        let local_port = tunnel::allocate_local_port(self.config.local_port_range)?;

        if let AuthMethod::Key { key_path, .. } = &inner.auth {
            match openssh::start_forward(
                &inner.host,
                inner.port,
                &inner.username,
                self.known_hosts.path(),
                local_port,
                remote_port,
                Some(key_path.as_path()),
            )
            .await
            {
                Ok(tunnel) => return Ok(ActiveTunnel::OpenSsh(tunnel)),
                Err(e @ RemoteError::Ssh(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "openssh forward unavailable; using library forward");
                }
            }
        }

        let tunnel = tunnel::start_forward(Arc::clone(transport), local_port, remote_port).await?;
        Ok(ActiveTunnel::Lib(tunnel))
    }

    /// Stop the peer and drop the tunnel, keeping the SSH connection.
    pub async fn stop_viewer(&self, id: &ConnectionId) -> Result<(), RemoteError> {
        let inner = self.get(id)?;
        if let Some(tunnel) = inner.tunnel.lock().await.take() {
            tunnel.shutdown().await;
        }
        let peer = inner.peer.lock().take();
        if let Some(peer) = peer {
            let transport = inner.transport.read().await.clone();
            peer::stop_viewer(&transport, peer.pid).await?;
        }
        inner.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Current viewer state for the API.
    pub async fn viewer_status(&self, id: &ConnectionId) -> Result<ViewerStatus, RemoteError> {
        let inner = self.get(id)?;
        let tunnel = inner.tunnel.lock().await;
        let peer = inner.peer.lock().clone();
        let status = ViewerStatus {
            state: inner.state(),
            viewer_url: tunnel.as_ref().map(|t| viewer_url(t.local_port())),
            peer,
            tunnel: tunnel.as_ref().and_then(|t| t.stats()),
        };
        Ok(status)
    }

    /// Run a layered health check now.
    pub async fn health(&self, id: &ConnectionId) -> Result<HealthReport, RemoteError> {
        let inner = self.get(id)?;
        let transport = inner.transport.read().await.clone();
        let peer = inner.peer.lock().clone();
        let local_port = inner.tunnel.lock().await.as_ref().map(|t| t.local_port());
        let report = health::check(&transport, peer.as_ref(), local_port).await;
        *inner.last_health.lock() = Some(report.clone());
        *inner.last_heartbeat.lock() = Utc::now();
        Ok(report)
    }

    /// Accept a host key explicitly (after a 409).
    pub fn add_known_host(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        public_key: &str,
    ) -> std::io::Result<()> {
        self.known_hosts.upsert(HostKeyRecord {
            host: host.to_string(),
            port,
            key_type: key_type.to_string(),
            public_key: public_key.to_string(),
        })
    }

    fn spawn_monitor(&self, inner: Arc<ConnectionInner>) {
        let connector = Arc::clone(&self.connector);
        let interval = self.config.health_interval;
        let backoff = self.config.reconnect_backoff.clone();
        let connect_timeout = self.config.connect_timeout;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = inner.monitor_stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let transport = inner.transport.read().await.clone();
                let peer = inner.peer.lock().clone();
                let local_port = inner.tunnel.lock().await.as_ref().map(|t| t.local_port());
                let report = health::check(&transport, peer.as_ref(), local_port).await;
                *inner.last_heartbeat.lock() = Utc::now();
                *inner.last_health.lock() = Some(report.clone());

                if !report.ssh_alive {
                    if !reconnect(&inner, &connector, &backoff, connect_timeout).await {
                        inner.set_state(ConnectionState::Failed);
                        warn!(connection = %inner.id, "reconnect attempts exhausted");
                        continue;
                    }
                    // Fresh transport; a lib tunnel rides the old one
                    rebuild_tunnel_if_needed(&inner).await;
                    continue;
                }

                match (peer.is_some(), report.viewer_running) {
                    (true, false) => {
                        // Peer crash: surface, never auto-restart
                        if inner.state() == ConnectionState::PeerRunning {
                            warn!(connection = %inner.id, "peer viewer died; degraded");
                        }
                        inner.set_state(ConnectionState::Degraded);
                    }
                    (true, true) if !report.tunnel_ok => {
                        rebuild_tunnel_if_needed(&inner).await;
                    }
                    (true, true) => inner.set_state(ConnectionState::PeerRunning),
                    (false, _) => {
                        if inner.state() == ConnectionState::Degraded {
                            inner.set_state(ConnectionState::Connected);
                        }
                    }
                }
            }
        });
    }
}

fn viewer_url(local_port: u16) -> String {
    format!("http://127.0.0.1:{local_port}")
}

/// Exponential-backoff reconnect; true when a new transport is in place.
async fn reconnect(
    inner: &Arc<ConnectionInner>,
    connector: &Arc<dyn Connector>,
    backoff: &[Duration],
    timeout: Duration,
) -> bool {
    let params = ConnectParams {
        host: inner.host.clone(),
        port: inner.port,
        username: inner.username.clone(),
        auth: inner.auth.clone(),
        timeout,
    };
    for (attempt, delay) in backoff.iter().enumerate() {
        tokio::time::sleep(*delay).await;
        match connector.connect(&params).await {
            Ok(transport) => {
                info!(connection = %inner.id, attempt = attempt + 1, "ssh reconnected");
                *inner.transport.write().await = transport;
                return true;
            }
            Err(e) => {
                warn!(connection = %inner.id, attempt = attempt + 1, error = %e, "reconnect failed");
            }
        }
    }
    false
}

/// Rebuild the library forward after transport loss or tunnel death.
async fn rebuild_tunnel_if_needed(inner: &Arc<ConnectionInner>) {
    let remote_port = match inner.peer.lock().as_ref() {
        Some(peer) => peer.remote_port,
        None => return,
    };
    let mut tunnel_slot = inner.tunnel.lock().await;
    let local_port = match tunnel_slot.as_ref() {
        Some(t) => t.local_port(),
        None => return,
    };
    if let Some(old) = tunnel_slot.take() {
        old.shutdown().await;
    }
    let transport = inner.transport.read().await.clone();
    match tunnel::start_forward(transport, local_port, remote_port).await {
        Ok(tunnel) => {
            info!(connection = %inner.id, local_port, "tunnel rebuilt");
            *tunnel_slot = Some(ActiveTunnel::Lib(tunnel));
        }
        Err(e) => {
            warn!(connection = %inner.id, error = %e, "tunnel rebuild failed");
            inner.set_state(ConnectionState::Degraded);
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
