// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket surface.

pub mod auth;
pub mod http_broadcasts;
pub mod http_contacts;
pub mod http_groups;
pub mod http_messages;
pub mod http_sessions;
pub mod ws;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = match state.config.cors_origins.as_deref() {
        Some(origins) => {
            let parsed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse::<axum::http::HeaderValue>().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        // Health (no auth)
        .route("/api/health", get(http_sessions::health))
        // Session lifecycle
        .route("/api/sessions", post(http_sessions::create_session).get(http_sessions::list_sessions))
        .route("/api/sessions/{sid}/status", get(http_sessions::session_status))
        .route("/api/sessions/{sid}/qr", get(http_sessions::session_qr))
        .route("/api/sessions/{sid}/connect", post(http_sessions::connect_session))
        .route("/api/sessions/{sid}/disconnect", post(http_sessions::disconnect_session))
        .route("/api/sessions/{sid}/cleanup", post(http_sessions::cleanup_session))
        .route("/api/sessions/{sid}", delete(http_sessions::delete_session))
        // One-shot sends
        .route("/api/send-message", post(http_messages::send_message))
        .route("/api/send-media", post(http_messages::send_media))
        // Broadcast campaigns
        .route("/api/broadcasts", post(http_broadcasts::create_campaign).get(http_broadcasts::list_campaigns))
        .route("/api/broadcasts/{cid}", get(http_broadcasts::campaign_detail))
        .route("/api/broadcasts/{cid}/execute", post(http_broadcasts::execute_campaign))
        .route("/api/broadcasts/{cid}/cancel", post(http_broadcasts::cancel_campaign))
        // Contacts
        .route("/api/contacts/{sid}/scrape", post(http_contacts::scrape_contacts))
        .route("/api/contacts/{sid}", get(http_contacts::list_contacts))
        .route("/api/contacts/{sid}/status", get(http_contacts::scrape_status))
        // Groups
        .route("/api/groups/{sid}/scrape", post(http_groups::scrape_groups))
        .route("/api/groups/{sid}", get(http_groups::list_groups))
        .route("/api/groups/members/{gid}/scrape", post(http_groups::scrape_group_members))
        .route("/api/group-broadcast/{sid}/send", post(http_groups::group_broadcast))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}
