// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contact scrape and listing handlers. Quota and cooldown violations map
//! to 429 through the rate-limited error kind.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::error::{ok, ApiEnvelope, GatewayError};
use crate::model::ContactRow;
use crate::scraper::{QuotaSnapshot, ScrapeOutcome};
use crate::state::AppState;
use crate::transport::auth::CurrentUser;

/// `POST /api/contacts/{sid}/scrape`
pub async fn scrape_contacts(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<ScrapeOutcome>>, GatewayError> {
    let outcome = s.scraper.scrape_contacts(user_id, &sid).await?;
    Ok(ok(outcome))
}

/// `GET /api/contacts/{sid}`
pub async fn list_contacts(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<Vec<ContactRow>>>, GatewayError> {
    let session = s.storage.session_owned(&sid, user_id)?;
    let rows = s.storage.list_contacts(user_id, session.id)?;
    Ok(ok(rows))
}

/// `GET /api/contacts/{sid}/status` — quota / cooldown snapshot.
pub async fn scrape_status(
    State(s): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(sid): Path<String>,
) -> Result<Json<ApiEnvelope<QuotaSnapshot>>, GatewayError> {
    let session = s.storage.session_owned(&sid, user_id)?;
    let snapshot = s.scraper.quota_snapshot(user_id, session.id, Utc::now())?;
    Ok(ok(snapshot))
}
