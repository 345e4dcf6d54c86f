// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot send handlers. Rate-limited like every other outbound path.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{ok, ApiEnvelope, GatewayError};
use crate::events::GatewayEvent;
use crate::inbound::jid::normalize_phone;
use crate::model::{Direction, MessageKind, MessageRow, MessageStatus};
use crate::state::AppState;
use crate::storage::messages::NewMessage;
use crate::transport::auth::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub session_id: String,
    pub to: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    pub session_id: String,
    pub to: String,
    pub media_url: String,
    #[serde(default)]
    pub caption: Option<String>,
    /// `image` or `document`.
    #[serde(default = "default_media_type", rename = "type")]
    pub kind: String,
}

fn default_media_type() -> String {
    "image".to_owned()
}

/// `POST /api/send-message`
pub async fn send_message(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ApiEnvelope<MessageRow>>, GatewayError> {
    if req.message.trim().is_empty() {
        return Err(GatewayError::invalid_argument("message must not be empty"));
    }
    let session = s.storage.session_owned(&req.session_id, user_id)?;
    let phone = normalize_phone(&req.to);
    if phone.is_empty() {
        return Err(GatewayError::invalid_argument("destination phone has no digits"));
    }

    let admission = s.limiter.check(session.id)?;
    if !admission.can_send {
        let reason = admission.reason.map(|r| r.message()).unwrap_or("rate limit");
        return Err(GatewayError::rate_limited(reason, admission.delay.as_millis() as u64));
    }
    tokio::time::sleep(admission.delay).await;

    let to_jid = format!("{phone}@s.whatsapp.net");
    let receipt = s.manager.send_text(&req.session_id, &to_jid, &req.message).await?;
    s.limiter.record_sent(session.id)?;

    let row = record_outgoing(
        &s,
        session.id,
        &receipt.message_id,
        session.phone_number.as_deref().unwrap_or_default(),
        &phone,
        MessageKind::Text,
        Some(req.message),
        None,
    )?;
    s.hub.publish_session(
        user_id,
        &req.session_id,
        GatewayEvent::MessageSent { session: req.session_id.clone(), message: row.clone() },
    );
    Ok(ok(row))
}

/// `POST /api/send-media`
pub async fn send_media(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<SendMediaRequest>,
) -> Result<Json<ApiEnvelope<MessageRow>>, GatewayError> {
    if req.media_url.trim().is_empty() {
        return Err(GatewayError::invalid_argument("mediaUrl must not be empty"));
    }
    let kind = match req.kind.as_str() {
        "image" => MessageKind::Image,
        "document" => MessageKind::Document,
        other => {
            return Err(GatewayError::invalid_argument(format!(
                "unsupported media type {other:?}"
            )));
        }
    };
    let session = s.storage.session_owned(&req.session_id, user_id)?;
    let phone = normalize_phone(&req.to);
    if phone.is_empty() {
        return Err(GatewayError::invalid_argument("destination phone has no digits"));
    }

    let admission = s.limiter.check(session.id)?;
    if !admission.can_send {
        let reason = admission.reason.map(|r| r.message()).unwrap_or("rate limit");
        return Err(GatewayError::rate_limited(reason, admission.delay.as_millis() as u64));
    }
    tokio::time::sleep(admission.delay).await;

    let to_jid = format!("{phone}@s.whatsapp.net");
    let receipt = match kind {
        MessageKind::Image => {
            s.manager
                .send_image(&req.session_id, &to_jid, &req.media_url, req.caption.as_deref())
                .await?
        }
        _ => {
            let filename = req.media_url.rsplit('/').next().unwrap_or("document");
            s.manager
                .send_document(
                    &req.session_id,
                    &to_jid,
                    &req.media_url,
                    filename,
                    "application/octet-stream",
                )
                .await?
        }
    };
    s.limiter.record_sent(session.id)?;

    let row = record_outgoing(
        &s,
        session.id,
        &receipt.message_id,
        session.phone_number.as_deref().unwrap_or_default(),
        &phone,
        kind,
        req.caption.clone(),
        Some(serde_json::json!({ "mediaUrl": req.media_url })),
    )?;
    s.hub.publish_session(
        user_id,
        &req.session_id,
        GatewayEvent::MessageSent { session: req.session_id.clone(), message: row.clone() },
    );
    Ok(ok(row))
}

#[allow(clippy::too_many_arguments)]
fn record_outgoing(
    s: &AppState,
    session_db_id: i64,
    message_id: &str,
    from: &str,
    to: &str,
    kind: MessageKind,
    content: Option<String>,
    media_meta: Option<serde_json::Value>,
) -> Result<MessageRow, GatewayError> {
    s.storage.insert_message(NewMessage {
        session_id: session_db_id,
        message_id: message_id.to_owned(),
        direction: Direction::Outgoing,
        message_type: kind,
        from_number: from.to_owned(),
        to_number: to.to_owned(),
        push_name: None,
        content,
        media_meta,
        status: MessageStatus::Pending,
        is_auto_reply: false,
        reply_source: None,
        reply_context: None,
    })?;
    s.storage.advance_message_status(message_id, MessageStatus::Sent, Utc::now())?;
    s.storage
        .message_by_external(message_id)?
        .ok_or_else(|| GatewayError::internal("outgoing row vanished"))
}
