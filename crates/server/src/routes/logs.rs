// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text-log range reads and the WebSocket tail.

use crate::error::ApiError;
use crate::rate_limit::EndpointClass;
use crate::tail::TailMsg;
use crate::validate::{self, ClientAddr};
use crate::AppState;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use rn_core::RunId;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Close code sent on persistent backpressure.
const CLOSE_OVERLOADED: u16 = 1011;

/// Consecutive lag events tolerated before the socket is dropped.
const MAX_LAG_STRIKES: u32 = 3;

/// Heartbeat cadence.
const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, Default)]
pub struct RangeQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

pub async fn get_logs(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<String, ApiError> {
    state.limiter.check(EndpointClass::List, ip)?;
    let id = validate::run_id(&id)?;
    let bytes = state.store.read_log_range(&id, range.from, range.to)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn logs_ws(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    Path(id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let id = validate::run_id(&id)?;
    // 404 before the upgrade so clients see a proper status
    state.store.get_run(&id)?;
    let permit = state.limiter.acquire_stream(ip)?;

    Ok(upgrade.on_upgrade(move |socket| async move {
        let _permit = permit;
        tail_session(state, id, socket).await;
    }))
}

/// Stream existing bytes, then relay growth frames until the client
/// leaves, the run finishes, or backpressure wins.
async fn tail_session(state: AppState, id: RunId, mut socket: WebSocket) {
    // Subscribe first so nothing appended during the snapshot is lost;
    // frames overlapping the snapshot are dropped by offset below.
    let mut rx = state.tails.subscribe(&id);

    let snapshot = match state.store.read_log_range(&id, None, None) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(run = %id, error = %e, "log snapshot failed");
            return;
        }
    };
    let mut consumed = snapshot.len() as u64;
    if !snapshot.is_empty()
        && socket
            .send(Message::Text(lossy_text(&snapshot)))
            .await
            .is_err()
    {
        return;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut lag_strikes = 0u32;

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // pongs and stray client frames
                    Some(Err(_)) => break,
                }
            }
            msg = rx.recv() => {
                match msg {
                    Ok(TailMsg::Data { offset, bytes }) => {
                        lag_strikes = 0;
                        let end = offset + bytes.len() as u64;
                        if end <= consumed {
                            continue; // fully covered by the snapshot
                        }
                        let skip = consumed.saturating_sub(offset) as usize;
                        consumed = end;
                        if socket
                            .send(Message::Text(lossy_text(&bytes[skip..])))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(TailMsg::Finished) => {
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code: 1000,
                                reason: Utf8Bytes::from_static("run finished"),
                            })))
                            .await;
                        break;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        lag_strikes += 1;
                        debug!(run = %id, missed, strikes = lag_strikes, "tail subscriber lagging");
                        if lag_strikes >= MAX_LAG_STRIKES {
                            let _ = socket
                                .send(Message::Close(Some(CloseFrame {
                                    code: CLOSE_OVERLOADED,
                                    reason: Utf8Bytes::from_static("client too slow"),
                                })))
                                .await;
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    debug!(run = %id, "log tail socket closed");
}

fn lossy_text(bytes: &[u8]) -> Utf8Bytes {
    String::from_utf8_lossy(bytes).into_owned().into()
}
