// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Read-only HTTP + WebSocket service over the run store.
//!
//! Stateless request handling; the only long-lived pieces are the
//! metrics cache, the per-run log tailers, and the remote controller.
//! Everything binds to a trusted network; there is no auth layer.

mod error;
mod rate_limit;
mod routes;
mod tail;
mod validate;

pub use error::ApiError;
pub use rate_limit::{EndpointClass, RateLimiter, RateLimiterConfig};
pub use tail::TailRegistry;

use axum::routing::{delete, get, post};
use axum::Router;
use rn_assets::BlobStore;
use rn_remote::RemoteController;
use rn_storage::{MetricsCache, RunStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RunStore>,
    pub cache: Arc<MetricsCache>,
    pub blobs: Arc<BlobStore>,
    pub remote: Arc<RemoteController>,
    pub tails: Arc<TailRegistry>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(store: Arc<RunStore>, remote: Arc<RemoteController>) -> AppState {
        let blobs = Arc::new(BlobStore::new(store.data_root()));
        AppState {
            cache: Arc::new(MetricsCache::default()),
            blobs,
            remote,
            tails: Arc::new(TailRegistry::new(Arc::clone(&store))),
            limiter: Arc::new(RateLimiter::default()),
            store,
        }
    }
}

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/runs", get(routes::runs::list_runs))
        .route("/api/runs/{id}", get(routes::runs::get_run))
        .route("/api/runs/{id}/metrics", get(routes::metrics::get_metrics))
        .route("/api/runs/{id}/logs", get(routes::logs::get_logs))
        .route("/api/runs/{id}/logs/ws", get(routes::logs::logs_ws))
        .route("/api/runs/{id}/media", get(routes::runs::list_media))
        .route("/api/runs/{id}/media/{name}", get(routes::runs::get_media))
        .route("/api/paths", get(routes::paths::flat_paths))
        .route("/api/paths/tree", get(routes::paths::path_tree))
        .route("/api/paths/runs", get(routes::paths::runs_under_prefix))
        .route("/api/paths/soft-delete", post(routes::paths::soft_delete))
        .route("/api/paths/export", get(routes::paths::export))
        .route("/api/assets/blob/{digest}", get(routes::assets::get_blob))
        .route("/api/remote/connect", post(routes::remote::connect))
        .route(
            "/api/remote/connections",
            get(routes::remote::list_connections),
        )
        .route(
            "/api/remote/connections/{id}",
            delete(routes::remote::disconnect),
        )
        .route(
            "/api/remote/environments",
            get(routes::remote::environments),
        )
        .route(
            "/api/remote/viewer/start",
            post(routes::remote::viewer_start),
        )
        .route("/api/remote/viewer/stop", post(routes::remote::viewer_stop))
        .route(
            "/api/remote/viewer/status",
            get(routes::remote::viewer_status),
        )
        .route("/api/remote/health", get(routes::remote::health))
        .route(
            "/api/remote/known-hosts/add",
            post(routes::remote::add_known_host),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let remote = Arc::clone(&state.remote);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "viewer listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        remote.shutdown().await;
    })
    .await
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod router_tests;
