// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API error taxonomy and HTTP mapping.
//!
//! Storage, assets, and remote errors map onto a small set of status
//! codes; bodies are `{detail, error?, context?}`. Host-key
//! confirmations are 409 with the structured problem attached.
//! Internal errors log with a correlation id and return a generic body.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rn_assets::AssetsError;
use rn_remote::{HostKeyProblem, RemoteError};
use rn_storage::StorageError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("path escapes the data root: {0}")]
    PathEscape(String),
    #[error("{0}")]
    NotFound(String),
    #[error("host key confirmation required")]
    HostKey(Box<HostKeyProblem>),
    #[error("rate limit exceeded")]
    RateLimited {
        limit: u32,
        retry_after_secs: u64,
    },
    #[error(transparent)]
    Remote(RemoteError),
    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    fn internal(e: impl std::error::Error + Send + Sync + 'static) -> ApiError {
        ApiError::Internal(Box::new(e))
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> ApiError {
        match e {
            StorageError::RunNotFound(id) => ApiError::NotFound(format!("run not found: {id}")),
            StorageError::MissingStatus(id) => {
                ApiError::NotFound(format!("run {id} has no status"))
            }
            StorageError::AlreadyExists(id) => {
                ApiError::BadRequest(format!("run already exists: {id}"))
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<AssetsError> for ApiError {
    fn from(e: AssetsError) -> ApiError {
        match e {
            AssetsError::BlobNotFound(d) => ApiError::NotFound(format!("blob not found: {d}")),
            AssetsError::ManifestNotFound(p) => {
                ApiError::NotFound(format!("manifest not found: {}", p.display()))
            }
            AssetsError::ArchiveEscape(p) => ApiError::PathEscape(p.display().to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<RemoteError> for ApiError {
    fn from(e: RemoteError) -> ApiError {
        match e {
            RemoteError::HostKey(problem) => ApiError::HostKey(problem),
            RemoteError::ConnectionNotFound(id) => {
                ApiError::NotFound(format!("connection not found: {id}"))
            }
            other => ApiError::Remote(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::PathEscape(detail) => (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": detail, "error": "path_escape" })),
            )
                .into_response(),
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::HostKey(problem) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "detail": format!(
                        "host key confirmation required for {}:{}",
                        problem.host, problem.port
                    ),
                    "error": "host_key_confirmation_required",
                    "problem": problem,
                })),
            )
                .into_response(),
            ApiError::RateLimited {
                limit,
                retry_after_secs,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "detail": "rate limit exceeded" })),
                )
                    .into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, header_value(retry_after_secs));
                headers.insert("X-RateLimit-Limit", header_value(limit as u64));
                headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
                response
            }
            ApiError::Remote(e) => {
                let body = json!({
                    "detail": e.to_string(),
                    "error": e.code(),
                    "context": { "suggestions": e.suggestions() },
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            ApiError::Internal(source) => {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                error!(%correlation_id, error = %source, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "detail": "internal error",
                        "context": { "correlation_id": correlation_id },
                    })),
                )
                    .into_response()
            }
        }
    }
}

fn header_value(n: u64) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or(HeaderValue::from_static("0"))
}
