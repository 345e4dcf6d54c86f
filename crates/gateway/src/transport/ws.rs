// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint — one connection per client, authenticated with the
//! handshake's `userId`, forwarding hub events the client's subscription
//! set admits. Session subscriptions replay a still-valid persisted QR.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{RawQuery, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use crate::events::{broadcast_key, session_key, GatewayEvent, SubscriptionSet};
use crate::state::AppState;
use crate::transport::auth;

/// `GET /ws?userId=<id>` — WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(user_id) = query.as_deref().and_then(auth::ws_user_id) else {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("missing userId"))
            .unwrap_or_default()
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_connection(state, user_id, socket)).into_response()
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AppState>, user_id: i64, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionSet::for_user(user_id);
    let mut hub_rx = state.hub.subscribe();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            envelope = hub_rx.recv() => {
                let envelope = match envelope {
                    Ok(e) => e,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                if subs.wants(&envelope) {
                    if let Ok(json) = serde_json::to_string(&envelope.event) {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&state, user_id, &mut subs, &mut ws_tx, &text)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

type WsSink = SplitSink<WebSocket, Message>;

/// Handle one client-initiated message. Errors mean the socket is gone.
async fn handle_client_message(
    state: &Arc<AppState>,
    user_id: i64,
    subs: &mut SubscriptionSet,
    ws_tx: &mut WsSink,
    text: &str,
) -> Result<(), ()> {
    let Ok(msg) = serde_json::from_str::<serde_json::Value>(text) else {
        return Ok(());
    };
    let event = msg.get("event").and_then(|v| v.as_str()).unwrap_or_default();

    match event {
        "subscribe:session" => {
            let Some(sid) = msg.get("session").and_then(|v| v.as_str()) else { return Ok(()) };
            // Only the owner may watch a session channel.
            let Ok(session) = state.storage.session_owned(sid, user_id) else {
                return Ok(());
            };
            subs.add(session_key(sid));

            // Replay a still-valid QR so late subscribers can pair.
            if session.qr_valid(Utc::now()) {
                if let (Some(qr_code), Some(expires_at)) = (session.qr_code, session.qr_expires_at)
                {
                    let replay = GatewayEvent::SessionQr {
                        session: sid.to_owned(),
                        qr_code,
                        expires_at,
                    };
                    if let Ok(json) = serde_json::to_string(&replay) {
                        ws_tx.send(Message::Text(json.into())).await.map_err(|_| ())?;
                    }
                }
            }
        }
        "unsubscribe:session" => {
            if let Some(sid) = msg.get("session").and_then(|v| v.as_str()) {
                subs.remove(&session_key(sid));
            }
        }
        "subscribe:broadcast" => {
            let Some(cid) = msg.get("campaign").and_then(|v| v.as_i64()) else { return Ok(()) };
            if state.storage.campaign_owned(cid, user_id).is_ok() {
                subs.add(broadcast_key(cid));
            }
        }
        "unsubscribe:broadcast" => {
            if let Some(cid) = msg.get("campaign").and_then(|v| v.as_i64()) {
                subs.remove(&broadcast_key(cid));
            }
        }
        "ping" => {
            ws_tx
                .send(Message::Text("{\"type\":\"pong\"}".to_owned().into()))
                .await
                .map_err(|_| ())?;
        }
        _ => {}
    }
    Ok(())
}
