// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path hierarchy endpoints and the archive export.

use crate::error::ApiError;
use crate::rate_limit::EndpointClass;
use crate::validate::{self, ClientAddr};
use crate::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rn_storage::RunQuery;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    #[serde(default)]
    pub include_stats: bool,
}

pub async fn flat_paths(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let paths = RunQuery::new(&state.store).flat_paths(query.include_stats)?;
    Ok(Json(json!({ "items": paths })))
}

pub async fn path_tree(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let tree = RunQuery::new(&state.store).path_tree()?;
    Ok(Json(json!({ "items": tree })))
}

#[derive(Debug, Deserialize, Default)]
pub struct PrefixQuery {
    #[serde(default)]
    pub prefix: String,
}

pub async fn runs_under_prefix(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let prefix = validate::path_prefix(&query.prefix)?;
    let runs = RunQuery::new(&state.store).runs_under_prefix(&prefix)?;
    Ok(Json(json!({ "items": runs })))
}

#[derive(Debug, Deserialize)]
pub struct SoftDeleteBody {
    pub prefix: String,
}

pub async fn soft_delete(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Json(body): Json<SoftDeleteBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::Write, ip)?;
    let prefix = validate::path_prefix(&body.prefix)?;
    if prefix.is_empty() {
        return Err(ApiError::BadRequest("prefix must not be empty".into()));
    }
    let deleted = RunQuery::new(&state.store).soft_delete_prefix(&prefix)?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn export(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<PrefixQuery>,
) -> Result<Response, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let prefix = validate::path_prefix(&query.prefix)?;

    let runs = RunQuery::new(&state.store).runs_under_prefix(&prefix)?;
    let ids: Vec<_> = runs.into_iter().map(|r| r.id).collect();
    if ids.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no runs under prefix {prefix:?}"
        )));
    }

    // Archives are modest (run metadata, events, logs, media); build in
    // memory off the blocking pool
    let root = state.store.data_root().clone();
    let bytes = tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        rn_assets::export_runs(&root, &ids, &mut buf).map(|()| buf)
    })
    .await
    .map_err(|e| ApiError::Internal(Box::new(e)))??;

    let filename = if prefix.is_empty() {
        "runs.tar.gz".to_string()
    } else {
        format!("{}.tar.gz", prefix.replace('/', "_"))
    };
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/gzip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(bytes))
        .unwrap_or_else(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}
