// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered connection health checks.
//!
//! Every interval, per connection: (1) SSH aliveness via a cheap remote
//! command, (2) peer health over HTTP through the tunnel, (3) local
//! port connectivity. The controller uses the report to drive the
//! degraded/recovery transitions.

use crate::peer::PeerInfo;
use crate::transport::{SshTransport, DEFAULT_RPC_TIMEOUT};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Interval between health passes.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// One layered health observation.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub ssh_alive: bool,
    pub viewer_running: bool,
    pub tunnel_ok: bool,
    pub is_healthy: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    fn unhealthy() -> HealthReport {
        HealthReport {
            ssh_alive: false,
            viewer_running: false,
            tunnel_ok: false,
            is_healthy: false,
            checked_at: Utc::now(),
        }
    }
}

/// Run one layered check.
pub async fn check(
    transport: &Arc<dyn SshTransport>,
    peer: Option<&PeerInfo>,
    local_port: Option<u16>,
) -> HealthReport {
    if !transport.is_alive().await {
        return HealthReport::unhealthy();
    }
    let ssh_alive = transport
        .exec("true", DEFAULT_RPC_TIMEOUT)
        .await
        .map(|o| o.success())
        .unwrap_or(false);
    if !ssh_alive {
        return HealthReport::unhealthy();
    }

    let viewer_running = match peer {
        Some(peer) => crate::peer::peer_alive(transport, peer.pid).await,
        None => false,
    };

    let tunnel_ok = match local_port {
        Some(port) => local_http_health(port).await,
        None => false,
    };

    HealthReport {
        ssh_alive,
        viewer_running,
        tunnel_ok,
        is_healthy: ssh_alive && viewer_running && tunnel_ok,
        checked_at: Utc::now(),
    }
}

/// Minimal HTTP/1.0 GET against the forwarded local port.
///
/// Avoids pulling a client stack into the controller for a two-line
/// probe; the peer's health endpoint returns a tiny JSON body.
pub async fn local_http_health(port: u16) -> bool {
    let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
    let Ok(Ok(mut stream)) = tokio::time::timeout(Duration::from_secs(2), connect).await else {
        return false;
    };
    let request = format!(
        "GET /api/health HTTP/1.0\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
    );
    if stream.write_all(request.as_bytes()).await.is_err() {
        return false;
    }
    let mut response = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response));
    if !matches!(read.await, Ok(Ok(_))) {
        return false;
    }
    let head = String::from_utf8_lossy(&response);
    head.starts_with("HTTP/1.0 200") || head.starts_with("HTTP/1.1 200")
}
