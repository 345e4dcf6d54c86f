// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ok, ApiEnvelope, GatewayError};
use crate::model::{SessionRow, SessionStatus};
use crate::state::AppState;
use crate::storage::sessions::NewSession;
use crate::transport::auth::CurrentUser;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub ai_assistant_type: Option<String>,
    #[serde(default)]
    pub ai_config: Option<serde_json::Value>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session: SessionRow,
    pub live: bool,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub qr_code: Option<String>,
    pub qr_expires_at: Option<chrono::DateTime<Utc>>,
    pub expired: bool,
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    #[serde(default)]
    pub logout: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<AppState>>) -> Json<ApiEnvelope<HealthResponse>> {
    let active = s.storage.list_sessions_count().unwrap_or(0);
    ok(HealthResponse { status: "running".to_owned(), active_sessions: active })
}

/// `POST /api/sessions` — create a session row and start pairing.
pub async fn create_session(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<ApiEnvelope<SessionRow>>, GatewayError> {
    if req.name.trim().is_empty() {
        return Err(GatewayError::invalid_argument("session name must not be empty"));
    }
    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if s.storage.session_by_external(&session_id)?.is_some() {
        return Err(GatewayError::invalid_argument(format!(
            "session {session_id} already exists"
        )));
    }

    let row = s.storage.create_session(NewSession {
        session_id: session_id.clone(),
        user_id,
        name: req.name,
        ai_assistant_type: req.ai_assistant_type,
        ai_config: req.ai_config,
        webhook_url: req.webhook_url,
        settings: req.settings,
    })?;

    s.manager.create(&session_id, user_id).await?;
    Ok(ok(row))
}

/// `GET /api/sessions[?active=true]`
pub async fn list_sessions(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ApiEnvelope<Vec<SessionRow>>>, GatewayError> {
    let rows = s.storage.list_sessions(user_id, query.active.unwrap_or(false))?;
    Ok(ok(rows))
}

/// `GET /api/sessions/{sid}/status` — row status reconciled with the live
/// transport.
pub async fn session_status(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<SessionStatusResponse>>, GatewayError> {
    let session = s.storage.session_owned(&sid, user_id)?;
    let live = s.manager.is_active(&sid).await;
    let connected = s.manager.is_connected(&sid).await;
    Ok(ok(SessionStatusResponse { session, live, connected }))
}

/// `GET /api/sessions/{sid}/qr`
pub async fn session_qr(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<QrResponse>>, GatewayError> {
    let session = s.storage.session_owned(&sid, user_id)?;
    let expired = !session.qr_valid(Utc::now());
    Ok(ok(QrResponse {
        qr_code: session.qr_code,
        qr_expires_at: session.qr_expires_at,
        expired,
    }))
}

/// `POST /api/sessions/{sid}/connect` — (re)start the driver; a fresh QR
/// follows over the event channel if pairing is needed.
pub async fn connect_session(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<SessionRow>>, GatewayError> {
    let session = s.storage.session_owned(&sid, user_id)?;
    if session.status == SessionStatus::Failed {
        // A failed session lost its credentials; pairing restarts from
        // scratch.
        s.storage.set_session_status(&sid, SessionStatus::QrPending, Utc::now())?;
    }
    s.manager.create(&sid, user_id).await?;
    let row = s.storage.session_owned(&sid, user_id)?;
    Ok(ok(row))
}

/// `POST /api/sessions/{sid}/disconnect` — body `{logout?: bool}`.
pub async fn disconnect_session(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
    body: Result<Json<DisconnectRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<ApiEnvelope<SessionRow>>, GatewayError> {
    s.storage.session_owned(&sid, user_id)?;
    // A missing or empty body means a plain disconnect.
    let logout = body.map(|Json(b)| b.logout).unwrap_or(false);
    if logout {
        s.manager.logout(&sid).await?;
    } else {
        s.manager.disconnect(&sid).await?;
    }
    let row = s.storage.session_owned(&sid, user_id)?;
    Ok(ok(row))
}

/// `POST /api/sessions/{sid}/cleanup` — purge on-disk credentials for a
/// stopped session.
pub async fn cleanup_session(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, GatewayError> {
    s.storage.session_owned(&sid, user_id)?;
    if s.manager.is_active(&sid).await {
        return Err(GatewayError::precondition(
            "disconnect the session before cleaning up credentials",
        ));
    }
    s.manager.purge_credentials(&sid)?;
    s.storage.clear_session_qr(&sid)?;
    Ok(ok(serde_json::json!({ "cleaned": true })))
}

/// `DELETE /api/sessions/{sid}` — disconnect and soft-delete.
pub async fn delete_session(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, GatewayError> {
    s.storage.session_owned(&sid, user_id)?;
    if s.manager.is_active(&sid).await {
        s.manager.disconnect(&sid).await?;
    }
    s.storage.soft_delete_session(&sid)?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
