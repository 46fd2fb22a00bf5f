// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote viewer control endpoints.

use crate::error::ApiError;
use crate::rate_limit::EndpointClass;
use crate::validate::ClientAddr;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use rn_core::ConnectionId;
use rn_remote::ConnectRequest;
use serde::Deserialize;
use serde_json::json;

pub async fn connect(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::Write, ip)?;
    let connection_id = state.remote.connect(request).await?;
    Ok(Json(json!({ "connection_id": connection_id })))
}

pub async fn list_connections(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    Ok(Json(json!({ "items": state.remote.list() })))
}

#[derive(Debug, Deserialize, Default)]
pub struct DisconnectQuery {
    #[serde(default)]
    pub cleanup_peer: bool,
}

pub async fn disconnect(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(id): Path<String>,
    Query(query): Query<DisconnectQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::Write, ip)?;
    state
        .remote
        .disconnect(&ConnectionId::new(id), query.cleanup_peer)
        .await?;
    Ok(Json(json!({ "status": "closed" })))
}

#[derive(Debug, Deserialize)]
pub struct ConnectionQuery {
    pub connection_id: String,
}

pub async fn environments(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<ConnectionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let envs = state
        .remote
        .environments(&ConnectionId::new(query.connection_id))
        .await?;
    Ok(Json(json!({ "items": envs })))
}

#[derive(Debug, Deserialize)]
pub struct ViewerStartBody {
    pub connection_id: String,
    pub env_name: String,
}

pub async fn viewer_start(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Json(body): Json<ViewerStartBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::Write, ip)?;
    let id = ConnectionId::new(body.connection_id);
    let status = state.remote.start_viewer(&id, &body.env_name).await?;
    Ok(Json(json!({
        "status": status.state,
        "viewer_url": status.viewer_url,
        "task_id": id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ViewerStopBody {
    pub connection_id: String,
}

pub async fn viewer_stop(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Json(body): Json<ViewerStopBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::Write, ip)?;
    state
        .remote
        .stop_viewer(&ConnectionId::new(body.connection_id))
        .await?;
    Ok(Json(json!({ "status": "stopped" })))
}

pub async fn viewer_status(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<ConnectionQuery>,
) -> Result<Json<rn_remote::ViewerStatus>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let status = state
        .remote
        .viewer_status(&ConnectionId::new(query.connection_id))
        .await?;
    Ok(Json(status))
}

pub async fn health(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Query(query): Query<ConnectionQuery>,
) -> Result<Json<rn_remote::HealthReport>, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let report = state
        .remote
        .health(&ConnectionId::new(query.connection_id))
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct AddKnownHostBody {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub key_type: String,
    pub public_key: String,
}

fn default_ssh_port() -> u16 {
    22
}

pub async fn add_known_host(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Json(body): Json<AddKnownHostBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limiter.check(EndpointClass::Write, ip)?;
    state
        .remote
        .add_known_host(&body.host, body.port, &body.key_type, &body.public_key)
        .map_err(|e| ApiError::Internal(Box::new(e)))?;
    Ok(Json(json!({ "status": "accepted" })))
}
