// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blob download.

use crate::error::ApiError;
use crate::rate_limit::EndpointClass;
use crate::validate::{self, ClientAddr};
use crate::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

pub async fn get_blob(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(digest): Path<String>,
) -> Result<Response, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let digest = validate::digest(&digest)?;

    let path = state.blobs.get_blob_path(&digest)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(Box::new(e)))?;

    // Content is immutable by construction: the digest IS the identity
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::ETAG, format!("\"{digest}\""))
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}
