// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics table endpoint with LTTB downsampling.

use crate::error::ApiError;
use crate::rate_limit::EndpointClass;
use crate::validate::{self, ClientAddr};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header::HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rn_storage::{MetricsTable, XAxis};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct MetricsQuery {
    /// `step` (default) or `time`.
    pub x: Option<String>,
    /// Target point count per series; absent disables downsampling.
    /// An explicit value caps rows at `min(target, total)`, so
    /// `downsample=0` returns an empty table.
    pub downsample: Option<usize>,
}

pub async fn get_metrics(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(id): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Result<Response, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let id = validate::run_id(&id)?;

    let x_axis = match query.x.as_deref() {
        None => XAxis::Step,
        Some(raw) => XAxis::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown x axis: {raw:?}")))?,
    };

    let rows = state.cache.rows(&state.store, &id)?;
    let table = MetricsTable::build(&rows, x_axis, query.downsample);

    let mut response = Json(&table).into_response();
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-row-count"),
        count_header(table.sampled),
    );
    headers.insert(
        HeaderName::from_static("x-total-count"),
        count_header(table.total),
    );
    if let Some(last_step) = table.last_step {
        headers.insert(
            HeaderName::from_static("x-last-step"),
            count_header(last_step as usize),
        );
    }
    Ok(response)
}

fn count_header(n: usize) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or(HeaderValue::from_static("0"))
}
