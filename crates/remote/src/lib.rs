// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Remote viewer controller.
//!
//! Manages SSH connections to remote hosts, discovers Python
//! environments carrying the runicorn package, launches a peer viewer
//! bound to the remote loopback, and forwards it to a verified local
//! port. Host keys are checked against a private known-hosts store and
//! are never accepted silently.

mod controller;
mod discover;
mod error;
mod health;
mod known_hosts;
mod openssh;
mod peer;
mod session;
mod transport;
mod tunnel;

pub use controller::{
    AuthMethod, ConnectRequest, ConnectionInfo, ConnectionState, RemoteController,
    RemoteControllerConfig, ViewerStatus,
};
pub use discover::PythonEnv;
pub use error::{HostKeyProblem, HostKeyReason, RemoteError, RemoteErrorCode};
pub use health::HealthReport;
pub use known_hosts::{HostKeyRecord, KnownHostsStore, Verification};
pub use peer::PeerInfo;
pub use session::RusshConnector;
pub use transport::{ConnectParams, Connector, ExecOutput, SshTransport};
pub use tunnel::{TunnelHandle, TunnelStats};

#[cfg(any(test, feature = "test-support"))]
pub use transport::fake::{FakeConnector, FakeTransport};
