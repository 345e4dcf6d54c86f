// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group scrape, member enumeration, and explicit group broadcast.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ok, ApiEnvelope, GatewayError};
use crate::model::GroupRow;
use crate::scraper::ScrapeOutcome;
use crate::state::AppState;
use crate::transport::auth::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBroadcastRequest {
    pub group_jids: Vec<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct GroupDelivery {
    pub group_jid: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupBroadcastResponse {
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<GroupDelivery>,
}

#[derive(Debug, Serialize)]
pub struct MemberScrapeResponse {
    pub group_id: i64,
    pub members: usize,
}

/// `POST /api/groups/{sid}/scrape`
pub async fn scrape_groups(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<ScrapeOutcome>>, GatewayError> {
    let outcome = s.scraper.scrape_groups(user_id, &sid).await?;
    Ok(ok(outcome))
}

/// `GET /api/groups/{sid}`
pub async fn list_groups(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<Vec<GroupRow>>>, GatewayError> {
    let session = s.storage.session_owned(&sid, user_id)?;
    let rows = s.storage.list_groups(user_id, session.id)?;
    Ok(ok(rows))
}

/// `POST /api/groups/members/{gid}/scrape`
pub async fn scrape_group_members(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(gid): Path<i64>,
) -> Result<Json<ApiEnvelope<MemberScrapeResponse>>, GatewayError> {
    let members = s.scraper.scrape_group_members(user_id, gid).await?;
    Ok(ok(MemberScrapeResponse { group_id: gid, members }))
}

/// `POST /api/group-broadcast/{sid}/send` — one message to an explicit
/// list of group JIDs, rate-limited per send, partial failures reported
/// per group.
pub async fn group_broadcast(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
    Json(req): Json<GroupBroadcastRequest>,
) -> Result<Json<ApiEnvelope<GroupBroadcastResponse>>, GatewayError> {
    if req.message.trim().is_empty() {
        return Err(GatewayError::invalid_argument("message must not be empty"));
    }
    if req.group_jids.is_empty() {
        return Err(GatewayError::invalid_argument("groupJids must not be empty"));
    }
    if req.group_jids.len() > 50 {
        return Err(GatewayError::invalid_argument("at most 50 groups per call"));
    }
    let session = s.storage.session_owned(&sid, user_id)?;

    let mut results = Vec::with_capacity(req.group_jids.len());
    for group_jid in &req.group_jids {
        let admission = s.limiter.check(session.id)?;
        if !admission.can_send {
            let reason = admission.reason.map(|r| r.message()).unwrap_or("rate limit");
            results.push(GroupDelivery {
                group_jid: group_jid.clone(),
                success: false,
                error: Some(reason.to_owned()),
            });
            continue;
        }
        tokio::time::sleep(admission.delay).await;

        match s.manager.send_text(&sid, group_jid, &req.message).await {
            Ok(_receipt) => {
                s.limiter.record_sent(session.id)?;
                results.push(GroupDelivery { group_jid: group_jid.clone(), success: true, error: None });
            }
            Err(e) => {
                results.push(GroupDelivery {
                    group_jid: group_jid.clone(),
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let sent = results.iter().filter(|r| r.success).count();
    let failed = results.len() - sent;
    Ok(ok(GroupBroadcastResponse { sent, failed, results }))
}
