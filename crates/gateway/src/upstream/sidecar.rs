// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production provider adapter. The vendor protocol library runs in a
//! sidecar process; commands go over its HTTP API, events arrive on a
//! per-session WebSocket as JSON frames. This module translates both
//! directions into the `ChatTransport` seam.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::{MessageKind, MessageStatus};
use crate::upstream::{
    ChatTransport, CloseReason, DirectoryEntry, GroupInfo, InboundMessage, MessageKey,
    ParticipantInfo, Presence, SendReceipt, TransportError, TransportEvent, TransportFactory,
    TransportLink, UpsertKind,
};

pub struct SidecarFactory {
    base_url: String,
    http: reqwest::Client,
}

impl SidecarFactory {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), http }
    }
}

#[async_trait]
impl TransportFactory for SidecarFactory {
    async fn connect(
        &self,
        session_id: &str,
        auth_dir: &Path,
    ) -> Result<TransportLink, TransportError> {
        // Ask the sidecar to open (or resume) the session, telling it
        // where its credentials live.
        let response = self
            .http
            .post(format!("{}/sessions/{session_id}/open", self.base_url))
            .json(&serde_json::json!({ "authDir": auth_dir.to_string_lossy() }))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("sidecar open: {e}")))?;
        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "sidecar open returned {}",
                response.status()
            )));
        }

        let ws_url = build_ws_url(&self.base_url, session_id);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| TransportError::new(format!("sidecar ws connect: {e}")))?;

        let closed = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(64);
        spawn_event_pump(session_id.to_owned(), ws_stream, event_tx, closed.clone());

        let transport = Arc::new(SidecarTransport {
            base_url: self.base_url.clone(),
            session_id: session_id.to_owned(),
            http: self.http.clone(),
            closed,
        });
        Ok(TransportLink { transport, events: event_rx })
    }
}

/// Build the per-session event feed URL from the sidecar's HTTP base.
fn build_ws_url(base_url: &str, session_id: &str) -> String {
    let ws_base = if base_url.starts_with("https://") {
        base_url.replacen("https://", "wss://", 1)
    } else {
        base_url.replacen("http://", "ws://", 1)
    };
    format!("{ws_base}/sessions/{session_id}/events")
}

/// Pump sidecar WS frames into the driver's event channel until the
/// socket ends or the transport is closed locally.
fn spawn_event_pump(
    session_id: String,
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    event_tx: mpsc::Sender<TransportEvent>,
    closed: CancellationToken,
) {
    tokio::spawn(async move {
        let (_, mut read) = ws_stream.split();
        loop {
            let frame = tokio::select! {
                _ = closed.cancelled() => break,
                frame = read.next() => frame,
            };
            match frame {
                Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                    if let Some(event) = parse_sidecar_frame(&text) {
                        let terminal = matches!(event, TransportEvent::Closed { .. });
                        if event_tx.send(event).await.is_err() || terminal {
                            break;
                        }
                    }
                }
                Some(Ok(_)) => {} // Ignore binary, ping, pong.
                Some(Err(e)) => {
                    tracing::debug!(session_id, err = %e, "sidecar feed error");
                    let _ = event_tx
                        .send(TransportEvent::Closed { reason: CloseReason::ConnectionLost })
                        .await;
                    break;
                }
                None => {
                    let _ = event_tx
                        .send(TransportEvent::Closed { reason: CloseReason::ConnectionClosed })
                        .await;
                    break;
                }
            }
        }
    });
}

/// Parse one sidecar JSON frame into a transport event.
///
/// Frames: `{"event":"qr","payload":...}`, `{"event":"pair","phone":...}`,
/// `{"event":"message",...}`, `{"event":"status",...}`,
/// `{"event":"closed","reason":...,"code":...}`.
pub(crate) fn parse_sidecar_frame(text: &str) -> Option<TransportEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let event = value.get("event")?.as_str()?;

    match event {
        "qr" => {
            let payload = value.get("payload")?.as_str()?.to_owned();
            Some(TransportEvent::Qr { payload })
        }
        "pair" => {
            let phone = value.get("phone")?.as_str()?.to_owned();
            Some(TransportEvent::PairingSuccess { phone })
        }
        "message" => {
            let kind = match value.get("kind").and_then(|v| v.as_str()) {
                Some("append") => UpsertKind::Append,
                _ => UpsertKind::Notify,
            };
            let timestamp = value
                .get("timestamp")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            Some(TransportEvent::MessageUpsert {
                kind,
                message: InboundMessage {
                    remote_jid: value.get("remoteJid")?.as_str()?.to_owned(),
                    from_me: value.get("fromMe").and_then(|v| v.as_bool()).unwrap_or(false),
                    participant: value
                        .get("participant")
                        .and_then(|v| v.as_str())
                        .map(str::to_owned),
                    message_id: value.get("messageId")?.as_str()?.to_owned(),
                    push_name: value.get("pushName").and_then(|v| v.as_str()).map(str::to_owned),
                    timestamp,
                    kind: value
                        .get("type")
                        .and_then(|v| v.as_str())
                        .map(MessageKind::parse)
                        .unwrap_or(MessageKind::Other),
                    text: value.get("text").and_then(|v| v.as_str()).map(str::to_owned),
                    media: value.get("media").cloned(),
                },
            })
        }
        "status" => {
            let message_id = value.get("messageId")?.as_str()?.to_owned();
            let status = value.get("status")?.as_str().map(MessageStatus::parse)?;
            Some(TransportEvent::MessageStatus { message_id, status })
        }
        "closed" => {
            let reason = match value.get("reason").and_then(|v| v.as_str()) {
                Some("logged_out") => CloseReason::LoggedOut,
                Some("bad_session") => CloseReason::BadSession,
                Some("replaced") => CloseReason::Replaced,
                Some("unauthorized") => CloseReason::Unauthorized(
                    value.get("code").and_then(|v| v.as_u64()).unwrap_or(401) as u16,
                ),
                Some("timed_out") => CloseReason::TimedOut,
                Some("connection_lost") => CloseReason::ConnectionLost,
                Some(other) => CloseReason::Other(other.to_owned()),
                None => CloseReason::ConnectionClosed,
            };
            Some(TransportEvent::Closed { reason })
        }
        _ => None,
    }
}

// -- Command half -------------------------------------------------------------

struct SidecarTransport {
    base_url: String,
    session_id: String,
    http: reqwest::Client,
    closed: CancellationToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptBody {
    message_id: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl SidecarTransport {
    fn url(&self, tail: &str) -> String {
        format!("{}/sessions/{}/{tail}", self.base_url, self.session_id)
    }

    async fn post_receipt(
        &self,
        tail: &str,
        body: serde_json::Value,
    ) -> Result<SendReceipt, TransportError> {
        let response = self.post(tail, body).await?;
        let receipt: ReceiptBody = response
            .json()
            .await
            .map_err(|e| TransportError::new(format!("sidecar receipt: {e}")))?;
        Ok(SendReceipt {
            message_id: receipt.message_id,
            timestamp: receipt.timestamp.unwrap_or_else(Utc::now),
        })
    }

    async fn post(
        &self,
        tail: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::closed("transport closed"));
        }
        let response = self
            .http
            .post(self.url(tail))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::closed(format!("sidecar unreachable: {e}"))
                } else {
                    TransportError::new(format!("sidecar request: {e}"))
                }
            })?;
        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "sidecar {tail} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        tail: &str,
    ) -> Result<T, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::closed("transport closed"));
        }
        let response = self
            .http
            .get(self.url(tail))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("sidecar request: {e}")))?;
        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "sidecar {tail} returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(|e| TransportError::new(format!("sidecar response: {e}")))
    }
}

#[async_trait]
impl ChatTransport for SidecarTransport {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, TransportError> {
        self.post_receipt("send-text", serde_json::json!({ "to": to, "body": body })).await
    }

    async fn send_image(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, TransportError> {
        self.post_receipt(
            "send-image",
            serde_json::json!({ "to": to, "url": url, "caption": caption }),
        )
        .await
    }

    async fn send_document(
        &self,
        to: &str,
        url: &str,
        filename: &str,
        mimetype: &str,
    ) -> Result<SendReceipt, TransportError> {
        self.post_receipt(
            "send-document",
            serde_json::json!({
                "to": to, "url": url, "filename": filename, "mimetype": mimetype
            }),
        )
        .await
    }

    async fn send_presence(&self, to: &str, presence: Presence) -> Result<(), TransportError> {
        let state = match presence {
            Presence::Composing => "composing",
            Presence::Paused => "paused",
        };
        self.post("presence", serde_json::json!({ "to": to, "state": state })).await.map(|_| ())
    }

    async fn mark_read(&self, key: &MessageKey) -> Result<(), TransportError> {
        self.post(
            "read",
            serde_json::json!({
                "remoteJid": key.remote_jid,
                "messageId": key.message_id,
                "participant": key.participant,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn contacts(&self) -> Result<Vec<DirectoryEntry>, TransportError> {
        self.get_json("contacts").await
    }

    async fn chats(&self) -> Result<Vec<DirectoryEntry>, TransportError> {
        self.get_json("chats").await
    }

    async fn groups(&self) -> Result<Vec<GroupInfo>, TransportError> {
        self.get_json("groups").await
    }

    async fn group_participants(
        &self,
        group_jid: &str,
    ) -> Result<Vec<ParticipantInfo>, TransportError> {
        self.get_json(&format!("groups/{group_jid}/participants")).await
    }

    async fn resolve_lids(
        &self,
        lids: &[String],
    ) -> Result<HashMap<String, String>, TransportError> {
        let response = self.post("resolve-lids", serde_json::json!({ "lids": lids })).await?;
        response.json().await.map_err(|e| TransportError::new(format!("sidecar response: {e}")))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.post("logout", serde_json::json!({})).await.map(|_| ())
    }

    async fn close(&self) {
        self.closed.cancel();
        let _ = self.http.post(self.url("close")).json(&serde_json::json!({})).send().await;
    }
}

#[cfg(test)]
#[path = "sidecar_tests.rs"]
mod tests;
