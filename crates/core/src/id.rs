// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes and run-id generation.
//!
//! Run ids are `YYYYMMDD_HHMMSS_` (UTC) followed by six random lowercase
//! hex characters: timestamp-sortable, collision-resistant, and safe as a
//! directory name.

use crate::clock::Clock;
use rand::Rng;
use thiserror::Error;

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a recorded run.
    ///
    /// Lexicographic order matches creation order at second granularity.
    pub struct RunId;
}

define_id! {
    /// Identifier for a remote SSH connection.
    pub struct ConnectionId;
}

define_id! {
    /// Identifier for a forwarded tunnel.
    pub struct TunnelId;
}

/// Errors from run-id validation.
#[derive(Debug, Error)]
pub enum RunIdError {
    #[error("malformed run id: {0}")]
    Malformed(String),
}

impl RunId {
    /// Validate the `YYYYMMDD_HHMMSS_xxxxxx` shape.
    ///
    /// Accepts exactly 8 digits, `_`, 6 digits, `_`, 6 lowercase hex chars.
    pub fn validate(s: &str) -> Result<RunId, RunIdError> {
        let bytes = s.as_bytes();
        let ok = bytes.len() == 22
            && bytes[..8].iter().all(u8::is_ascii_digit)
            && bytes[8] == b'_'
            && bytes[9..15].iter().all(u8::is_ascii_digit)
            && bytes[15] == b'_'
            && bytes[16..]
                .iter()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b));
        if ok {
            Ok(RunId::new(s))
        } else {
            Err(RunIdError::Malformed(s.to_string()))
        }
    }
}

/// Generates run identifiers.
pub trait RunIdGen: Clone + Send + Sync + 'static {
    fn next(&self) -> RunId;
}

/// Timestamp + random suffix generator for production use.
#[derive(Clone)]
pub struct SystemRunIdGen<C: Clock> {
    clock: C,
}

impl<C: Clock> SystemRunIdGen<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> RunIdGen for SystemRunIdGen<C> {
    fn next(&self) -> RunId {
        let ts = self.clock.now().format("%Y%m%d_%H%M%S");
        let suffix: u32 = rand::rng().random_range(0..0x100_0000);
        RunId::new(format!("{ts}_{suffix:06x}"))
    }
}

/// Deterministic generator for tests: fixed timestamp, counting suffix.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct SequentialRunIdGen {
    stamp: String,
    counter: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

#[cfg(any(test, feature = "test-support"))]
impl SequentialRunIdGen {
    pub fn new(stamp: impl Into<String>) -> Self {
        Self {
            stamp: stamp.into(),
            counter: std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0)),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for SequentialRunIdGen {
    fn default() -> Self {
        Self::new("20260101_120000")
    }
}

#[cfg(any(test, feature = "test-support"))]
impl RunIdGen for SequentialRunIdGen {
    fn next(&self) -> RunId {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        RunId::new(format!("{}_{:06x}", self.stamp, n))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
