// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use indexmap::IndexMap;
use rn_core::{ConnectionId, DataRoot, MetricMode, RunPath, SequentialRunIdGen};
use rn_remote::{
    Connector, FakeConnector, FakeTransport, KnownHostsStore, RemoteController,
    RemoteControllerConfig,
};
use rn_storage::RunStore;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    state: AppState,
}

impl Fixture {
    fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            RunStore::open_with_id_gen(DataRoot::new(dir.path()), SequentialRunIdGen::default())
                .unwrap(),
        );
        let remote = Arc::new(RemoteController::with_connector(
            KnownHostsStore::new(dir.path().join("known_hosts")),
            Arc::new(FakeConnector {
                transport: FakeTransport::new(),
            }),
            RemoteControllerConfig {
                health_interval: std::time::Duration::from_secs(3600),
                ..RemoteControllerConfig::default()
            },
        ));
        Fixture {
            state: AppState::new(store, remote),
            _dir: dir,
        }
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }

    fn seed_run(&self, path: &str) -> rn_core::RunId {
        self.state
            .store
            .create_run(&RunPath::parse(path).unwrap(), None)
            .unwrap()
            .meta
            .id
    }

    fn append(&self, id: &rn_core::RunId, step: u64, loss: f64) {
        let mut fields = IndexMap::new();
        fields.insert("loss".to_string(), loss);
        self.state
            .store
            .append_event(id, Some(step), None, fields)
            .unwrap();
    }
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value, headers)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_version() {
    let fixture = Fixture::new();
    let (status, body, _) = get(fixture.app(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn list_runs_returns_created_run() {
    let fixture = Fixture::new();
    let id = fixture.seed_run("cv/resnet50/baseline");
    fixture.append(&id, 1, 0.5);

    let (status, body, _) = get(fixture.app(), "/api/runs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], id.as_str());
    assert_eq!(body["items"][0]["status"], "running");
    assert!(body["items"][0].get("primary_metric").is_none());
}

#[tokio::test]
async fn run_detail_includes_primary_metric_after_improvement() {
    let fixture = Fixture::new();
    let id = fixture.seed_run("cv/a");
    fixture
        .state
        .store
        .set_primary_metric(&id, "loss", MetricMode::Min)
        .unwrap();
    fixture.append(&id, 4, 0.2);

    let (status, body, _) = get(fixture.app(), &format!("/api/runs/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary_metric"]["best"], 0.2);
    assert_eq!(body["primary_metric"]["step"], 4);
}

#[tokio::test]
async fn malformed_run_id_is_400_and_unknown_is_404() {
    let fixture = Fixture::new();
    let (status, _, _) = get(fixture.app(), "/api/runs/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(fixture.app(), "/api/runs/20260101_120000_ffffff").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_sets_count_headers() {
    let fixture = Fixture::new();
    let id = fixture.seed_run("cv/a");
    for step in 0..100 {
        fixture.append(&id, step, 1.0 / (1.0 + step as f64));
    }

    let (status, body, headers) = get(
        fixture.app(),
        &format!("/api/runs/{id}/metrics?x=step&downsample=10"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-total-count"], "100");
    assert_eq!(headers["x-row-count"], "10");
    assert_eq!(headers["x-last-step"], "99");
    assert_eq!(body["total"], 100);
    assert_eq!(body["sampled"], 10);
    assert_eq!(body["columns"][0], "step");
    // Endpoints preserved
    assert_eq!(body["rows"][0][0], 0.0);
    assert_eq!(body["rows"][9][0], 99.0);
}

#[tokio::test]
async fn downsample_absent_and_zero_differ() {
    let fixture = Fixture::new();
    let id = fixture.seed_run("cv/a");
    for step in 0..20 {
        fixture.append(&id, step, 0.5);
    }

    // Absent: every raw row comes back
    let (status, body, headers) =
        get(fixture.app(), &format!("/api/runs/{id}/metrics?x=step")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-row-count"], "20");
    assert_eq!(body["sampled"], 20);

    // Explicit zero: min(0, total) rows
    let (status, body, headers) = get(
        fixture.app(),
        &format!("/api/runs/{id}/metrics?x=step&downsample=0"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-row-count"], "0");
    assert_eq!(headers["x-total-count"], "20");
    assert_eq!(body["sampled"], 0);
    assert_eq!(body["rows"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn logs_endpoint_honors_byte_ranges() {
    let fixture = Fixture::new();
    let id = fixture.seed_run("cv/a");
    fixture.state.store.append_log(&id, b"0123456789").unwrap();

    let (status, _, _) = get(fixture.app(), &format!("/api/runs/{id}/logs")).await;
    assert_eq!(status, StatusCode::OK);

    let response = fixture
        .app()
        .oneshot(
            Request::builder()
                .uri(format!("/api/runs/{id}/logs?from=2&to=5"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"234");
}

#[tokio::test]
async fn path_tree_aggregates() {
    let fixture = Fixture::new();
    fixture.seed_run("cv/resnet50/a");
    fixture.seed_run("cv/resnet50/b");

    let (status, body, _) = get(fixture.app(), "/api/paths/tree").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["name"], "cv");
    assert_eq!(body["items"][0]["run_count"], 2);
    assert_eq!(body["items"][0]["has_running"], true);
}

#[tokio::test]
async fn soft_delete_prefix_hides_runs() {
    let fixture = Fixture::new();
    fixture.seed_run("cv/a");
    fixture.seed_run("nlp/b");

    let (status, body) = post(
        fixture.app(),
        "/api/paths/soft-delete",
        serde_json::json!({ "prefix": "cv" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (_, body, _) = get(fixture.app(), "/api/runs").await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn traversal_prefix_is_403() {
    let fixture = Fixture::new();
    let (status, _, _) = get(fixture.app(), "/api/paths/runs?prefix=a/../b").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn blob_download_carries_immutable_etag() {
    let fixture = Fixture::new();
    let (digest, _) = fixture.state.blobs.store_bytes(b"artifact bytes").unwrap();

    let response = fixture
        .app()
        .oneshot(
            Request::builder()
                .uri(format!("/api/assets/blob/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ETAG],
        format!("\"{digest}\"").as_str()
    );
    assert!(response.headers()[header::CACHE_CONTROL]
        .to_str()
        .unwrap()
        .contains("immutable"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"artifact bytes");
}

#[tokio::test]
async fn missing_blob_is_404() {
    let fixture = Fixture::new();
    let missing = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    let (status, _, _) = get(fixture.app(), &format!("/api/assets/blob/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_streams_gzip() {
    let fixture = Fixture::new();
    fixture.seed_run("cv/a");

    let response = fixture
        .app()
        .oneshot(
            Request::builder()
                .uri("/api/paths/export?prefix=cv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/gzip");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // gzip magic
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
}

#[tokio::test]
async fn list_quota_exhaustion_is_429_with_headers() {
    let fixture = Fixture::new();
    let state = AppState {
        limiter: Arc::new(RateLimiter::new(RateLimiterConfig {
            list_per_window: 2,
            ..RateLimiterConfig::default()
        })),
        ..fixture.state.clone()
    };
    let app = router(state);

    for _ in 0..2 {
        let (status, _, _) = get(app.clone(), "/api/runs").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, headers) = get(app, "/api/runs").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert!(headers.contains_key(header::RETRY_AFTER));
}

/// Connector that enforces known-hosts verification like the real one.
struct HostKeyGatedConnector {
    store: KnownHostsStore,
    transport: Arc<FakeTransport>,
}

const TEST_KEY: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIFoo";

#[async_trait::async_trait]
impl Connector for HostKeyGatedConnector {
    async fn connect(
        &self,
        params: &rn_remote::ConnectParams,
    ) -> Result<Arc<dyn rn_remote::SshTransport>, rn_remote::RemoteError> {
        match self
            .store
            .verify(&params.host, params.port, "ssh-ed25519", TEST_KEY)
            .map_err(rn_remote::RemoteError::Io)?
        {
            rn_remote::Verification::Trusted => Ok(Arc::new(Arc::clone(&self.transport))),
            rn_remote::Verification::Problem(p) => {
                Err(rn_remote::RemoteError::HostKey(Box::new(p)))
            }
        }
    }
}

#[tokio::test]
async fn host_key_flow_409_then_accept_then_connect() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        RunStore::open_with_id_gen(DataRoot::new(dir.path()), SequentialRunIdGen::default())
            .unwrap(),
    );
    let known_hosts = KnownHostsStore::new(dir.path().join("known_hosts"));
    let remote = Arc::new(RemoteController::with_connector(
        known_hosts.clone(),
        Arc::new(HostKeyGatedConnector {
            store: known_hosts,
            transport: FakeTransport::new(),
        }),
        RemoteControllerConfig {
            health_interval: std::time::Duration::from_secs(3600),
            ..RemoteControllerConfig::default()
        },
    ));
    let state = AppState::new(store, remote);

    let connect_body = serde_json::json!({
        "host": "gpu01",
        "username": "alice",
        "auth": {"method": "password", "password": "secret"},
    });

    // Unknown key: 409 with the structured problem
    let (status, body) =
        post(router(state.clone()), "/api/remote/connect", connect_body.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["problem"]["reason"], "unknown");
    assert!(body["problem"]["fingerprint_sha256"].as_str().is_some());

    // Accept the key, retry: connected
    let (status, _) = post(
        router(state.clone()),
        "/api/remote/known-hosts/add",
        serde_json::json!({
            "host": "gpu01",
            "key_type": "ssh-ed25519",
            "public_key": TEST_KEY,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(router(state.clone()), "/api/remote/connect", connect_body).await;
    assert_eq!(status, StatusCode::OK);
    let connection_id = body["connection_id"].as_str().unwrap().to_string();

    // Listed and disconnectable
    let (_, body, _) = get(router(state.clone()), "/api/remote/connections").await;
    assert_eq!(body["items"][0]["connection_id"], connection_id.as_str());

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/remote/connections/{connection_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_connection_queries_are_404() {
    let fixture = Fixture::new();
    let missing = ConnectionId::new("conn-missing");
    let (status, _, _) = get(
        fixture.app(),
        &format!("/api/remote/health?connection_id={missing}"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
