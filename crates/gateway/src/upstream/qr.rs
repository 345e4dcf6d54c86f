// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! QR pairing payloads: re-encode as a displayable image, persist with
//! expiry, publish to the owning user and the session channel.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use qrcode::render::svg;
use qrcode::QrCode;

use crate::error::GatewayError;
use crate::events::{EventHub, GatewayEvent};
use crate::storage::Storage;

/// Render a pairing payload as an SVG image wrapped in a data URL.
pub fn encode_qr_data_url(payload: &str) -> Result<String, GatewayError> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| GatewayError::internal(format!("qr encode: {e}")))?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", BASE64.encode(image)))
}

/// Persist the rendered QR with its expiry, then fan out `session:qr`.
/// A persistence failure is logged by the caller but never suppresses the
/// event — observers can still pair from the pushed payload.
pub fn publish_qr(
    storage: &Storage,
    hub: &EventHub,
    user_id: i64,
    session_id: &str,
    payload: &str,
    ttl: chrono::Duration,
) -> Result<(), GatewayError> {
    let image = encode_qr_data_url(payload)?;
    let expires_at = Utc::now() + ttl;

    let persisted = storage.set_session_qr(session_id, &image, expires_at);

    hub.publish_session(
        user_id,
        session_id,
        GatewayEvent::SessionQr { session: session_id.to_owned(), qr_code: image, expires_at },
    );

    persisted
}

#[cfg(test)]
#[path = "qr_tests.rs"]
mod tests;
