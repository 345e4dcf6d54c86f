// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast campaign HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::RecipientInput;
use crate::error::{ok, ApiEnvelope, GatewayError};
use crate::model::{CampaignRow, CampaignStatus, RecipientRow, Template};
use crate::state::AppState;
use crate::transport::auth::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub session_id: String,
    pub name: String,
    pub template: Template,
    pub recipients: Vec<RecipientInput>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub batch_delay_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: CampaignRow,
    pub pending: i64,
    pub recipients: Vec<RecipientRow>,
}

/// `POST /api/broadcasts`
pub async fn create_campaign(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<Json<ApiEnvelope<CampaignRow>>, GatewayError> {
    let campaign = s
        .broadcasts
        .create(
            user_id,
            &req.session_id,
            req.name,
            req.template,
            req.recipients,
            req.scheduled_at,
            req.batch_size,
            req.batch_delay_ms,
        )
        .await?;
    Ok(ok(campaign))
}

/// `GET /api/broadcasts[?status=...]`
pub async fn list_campaigns(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<ApiEnvelope<Vec<CampaignRow>>>, GatewayError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let rows = s.storage.list_campaigns(user_id, status)?;
    Ok(ok(rows))
}

/// `GET /api/broadcasts/{cid}`
pub async fn campaign_detail(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(cid): Path<i64>,
) -> Result<Json<ApiEnvelope<CampaignDetail>>, GatewayError> {
    let campaign = s.storage.campaign_owned(cid, user_id)?;
    let recipients = s.storage.list_recipients(cid)?;
    let pending = campaign.pending();
    Ok(ok(CampaignDetail { campaign, pending, recipients }))
}

/// `POST /api/broadcasts/{cid}/execute` — returns immediately; delivery
/// continues in the background.
pub async fn execute_campaign(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(cid): Path<i64>,
) -> Result<Json<ApiEnvelope<CampaignRow>>, GatewayError> {
    let campaign = s.broadcasts.execute(user_id, cid).await?;
    Ok(ok(campaign))
}

/// `POST /api/broadcasts/{cid}/cancel`
pub async fn cancel_campaign(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(cid): Path<i64>,
) -> Result<Json<ApiEnvelope<CampaignRow>>, GatewayError> {
    let campaign = s.broadcasts.cancel(user_id, cid).await?;
    Ok(ok(campaign))
}

fn parse_status(raw: &str) -> Result<CampaignStatus, GatewayError> {
    match raw {
        "draft" | "scheduled" | "processing" | "completed" | "failed" | "cancelled" => {
            Ok(CampaignStatus::parse(raw))
        }
        other => Err(GatewayError::invalid_argument(format!("unknown campaign status {other:?}"))),
    }
}
