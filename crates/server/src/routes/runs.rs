// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run listing, detail, and media.

use crate::error::ApiError;
use crate::rate_limit::EndpointClass;
use crate::validate::{self, ClientAddr};
use crate::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rn_core::RunStatus;
use rn_storage::{ListFilter, RunQuery, SortBy, SortDir, DEFAULT_PAGE_SIZE};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub path_prefix: Option<String>,
    /// Comma-separated statuses.
    pub status: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn list_runs(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;

    let mut filter = ListFilter {
        include_deleted: query.include_deleted,
        ..ListFilter::default()
    };
    if let Some(prefix) = &query.path_prefix {
        let prefix = validate::path_prefix(prefix)?;
        if !prefix.is_empty() {
            filter.path_prefix = Some(prefix);
        }
    }
    if let Some(statuses) = &query.status {
        for raw in statuses.split(',').filter(|s| !s.is_empty()) {
            let status = RunStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status: {raw:?}")))?;
            filter.status_in.push(status);
        }
    }

    let sort_by = match query.sort_by.as_deref() {
        None => SortBy::CreatedAt,
        Some(raw) => SortBy::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown sort_by: {raw:?}")))?,
    };
    let sort_dir = match query.sort_dir.as_deref() {
        None => SortDir::Desc,
        Some(raw) => SortDir::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown sort_dir: {raw:?}")))?,
    };

    let page = RunQuery::new(&state.store).list_runs(
        &filter,
        sort_by,
        sort_dir,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
    )?;

    Ok(Json(json!({
        "items": page.items,
        "total": page.total,
        "page": page.page,
        "per_page": page.per_page,
        "has_next": page.has_next,
        "has_prev": page.has_prev,
    })))
}

pub async fn get_run(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let id = validate::run_id(&id)?;
    let detail = state.store.get_run(&id)?;
    let summary = state.store.get_summary(&id)?;
    let mut body = serde_json::to_value(&detail).map_err(|e| ApiError::Internal(Box::new(e)))?;
    if let Some(object) = body.as_object_mut() {
        if !summary.is_empty() {
            object.insert("summary".to_string(), serde_json::Value::Object(summary));
        }
    }
    Ok(Json(body))
}

pub async fn list_media(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let id = validate::run_id(&id)?;
    // Existence check doubles as the 404 path
    state.store.get_run(&id)?;

    let media_dir = state.store.data_root().run(&id).media_dir();
    let mut items = Vec::new();
    if media_dir.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(&media_dir)
            .map_err(|e| ApiError::Internal(Box::new(e)))?
            .filter_map(|e| e.ok())
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let mime = mime_guess::from_path(&name).first_or_octet_stream();
            items.push(json!({
                "name": name,
                "size": size,
                "content_type": mime.as_ref(),
            }));
        }
    }
    Ok(Json(json!({ "items": items })))
}

pub async fn get_media(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let id = validate::run_id(&id)?;
    let name = validate::media_name(&name)?;

    let path = state.store.data_root().run(&id).media_dir().join(&name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("media not found: {name}")))
        }
        Err(e) => return Err(ApiError::Internal(Box::new(e))),
    };
    let mime = mime_guess::from_path(&name).first_or_octet_stream();
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(bytes))
        .unwrap_or_else(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}
