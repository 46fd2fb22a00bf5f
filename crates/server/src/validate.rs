// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request input validation.
//!
//! Identifiers are checked against their exact shapes; path-like inputs
//! are rejected on `..` segments or absolute forms before they reach
//! the filesystem.

use crate::error::ApiError;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use rn_core::{Digest, RunId};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Validate a run id path parameter.
pub fn run_id(raw: &str) -> Result<RunId, ApiError> {
    RunId::validate(raw).map_err(|_| ApiError::BadRequest(format!("malformed run id: {raw:?}")))
}

/// Validate a blob digest path parameter.
pub fn digest(raw: &str) -> Result<Digest, ApiError> {
    Digest::parse(raw).map_err(|_| ApiError::BadRequest(format!("malformed digest: {raw:?}")))
}

/// Validate a run-path prefix query parameter.
///
/// Empty means "everything". Segment shapes are enforced loosely here
/// (the stored paths were validated at write time); traversal and
/// absolute forms are hard rejections.
pub fn path_prefix(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim_matches('/');
    if raw.starts_with('/') && !trimmed.is_empty() {
        return Err(ApiError::PathEscape(raw.to_string()));
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(ApiError::PathEscape(raw.to_string()));
    }
    if trimmed.len() > rn_core::path::MAX_PATH_LEN {
        return Err(ApiError::BadRequest(format!(
            "prefix exceeds {} characters",
            rn_core::path::MAX_PATH_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate a media file name (single path segment).
pub fn media_name(raw: &str) -> Result<String, ApiError> {
    if raw.is_empty()
        || raw == ".."
        || raw.contains('/')
        || raw.contains('\\')
        || raw.contains('\0')
    {
        return Err(ApiError::PathEscape(raw.to_string()));
    }
    Ok(raw.to_string())
}

/// Client address for rate limiting; loopback when unavailable (tests,
/// unix sockets).
pub struct ClientAddr(pub IpAddr);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(ClientAddr(ip))
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
