// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local-forward tunnels.
//!
//! A tunnel binds a loopback listener on a port from the configured
//! range and forwards each accepted connection to the remote loopback
//! through the SSH transport, counting bytes both ways. The forward
//! loop exits when the stop token fires or the transport dies.

use crate::error::RemoteError;
use crate::transport::SshTransport;
use rn_core::TunnelId;
use serde::Serialize;
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default local port range for forwarded viewers.
pub const LOCAL_PORT_RANGE: (u16, u16) = (8081, 8099);

/// Live tunnel state shared with the controller.
pub struct TunnelHandle {
    pub id: TunnelId,
    pub local_port: u16,
    pub remote_port: u16,
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
    stop: CancellationToken,
}

/// Snapshot of tunnel counters for status APIs.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelStats {
    pub id: TunnelId,
    pub local_port: u16,
    pub remote_port: u16,
    pub active: bool,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl TunnelHandle {
    pub fn stats(&self) -> TunnelStats {
        TunnelStats {
            id: self.id.clone(),
            local_port: self.local_port,
            remote_port: self.remote_port,
            active: self.active.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Stop the forward loop and all live proxied connections.
    pub fn shutdown(&self) {
        self.stop.cancel();
        self.active.store(false, Ordering::Relaxed);
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Find a free local port in `range`, probing in order.
pub fn allocate_local_port(range: (u16, u16)) -> Result<u16, RemoteError> {
    for port in range.0..=range.1 {
        if StdTcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }
    Err(RemoteError::NoFreePort {
        start: range.0,
        end: range.1,
    })
}

/// Start forwarding `127.0.0.1:<local_port>` to the remote loopback.
pub async fn start_forward(
    transport: Arc<dyn SshTransport>,
    local_port: u16,
    remote_port: u16,
) -> Result<TunnelHandle, RemoteError> {
    let listener = TcpListener::bind(("127.0.0.1", local_port))
        .await
        .map_err(|e| RemoteError::Tunnel(format!("cannot bind 127.0.0.1:{local_port}: {e}")))?;

    let handle = TunnelHandle {
        id: TunnelId::new(uuid::Uuid::new_v4().to_string()),
        local_port,
        remote_port,
        bytes_in: Arc::new(AtomicU64::new(0)),
        bytes_out: Arc::new(AtomicU64::new(0)),
        active: Arc::new(AtomicBool::new(true)),
        stop: CancellationToken::new(),
    };

    let stop = handle.stop.clone();
    let active = Arc::clone(&handle.active);
    let bytes_in = Arc::clone(&handle.bytes_in);
    let bytes_out = Arc::clone(&handle.bytes_out);
    let tunnel_id = handle.id.clone();

    tokio::spawn(async move {
        info!(tunnel = %tunnel_id, local_port, remote_port, "tunnel listening");
        loop {
            let accepted = tokio::select! {
                _ = stop.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (client, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(tunnel = %tunnel_id, error = %e, "accept failed");
                    break;
                }
            };
            debug!(tunnel = %tunnel_id, %peer, "proxying connection");

            let stream = match transport.open_direct_tcpip(remote_port).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(tunnel = %tunnel_id, error = %e, "direct-tcpip open failed");
                    active.store(false, Ordering::Relaxed);
                    break;
                }
            };

            tokio::spawn(proxy(
                client,
                stream,
                Arc::clone(&bytes_in),
                Arc::clone(&bytes_out),
                stop.clone(),
            ));
        }
        active.store(false, Ordering::Relaxed);
        info!(tunnel = %tunnel_id, "tunnel closed");
    });

    Ok(handle)
}

/// Pump bytes both ways, counting them, until either side closes or the
/// stop token fires.
async fn proxy(
    client: tokio::net::TcpStream,
    remote: Box<dyn crate::transport::TransportStream>,
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
    stop: CancellationToken,
) {
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);

    let upstream = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = client_read.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            remote_write.write_all(&buf[..n]).await?;
            bytes_out.fetch_add(n as u64, Ordering::Relaxed);
        }
        remote_write.shutdown().await
    };

    let downstream = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = remote_read.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            client_write.write_all(&buf[..n]).await?;
            bytes_in.fetch_add(n as u64, Ordering::Relaxed);
        }
        client_write.shutdown().await
    };

    tokio::select! {
        _ = stop.cancelled() => {}
        result = async { tokio::try_join!(upstream, downstream) } => {
            if let Err(e) = result {
                debug!(error = %e, "proxied connection ended");
            }
        }
    }
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
