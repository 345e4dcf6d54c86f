// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request identity. Authentication itself is an upstream concern; the
//! gateway trusts the `X-User-Id` header set by the fronting proxy (a JWT
//! replaces it in production) and the `userId` query on the WebSocket
//! handshake.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::GatewayError;

/// Extracted tenant user id.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .map(CurrentUser)
            .ok_or_else(|| GatewayError::forbidden("missing or invalid X-User-Id header"))
    }
}

/// Parse the `userId` query parameter from a WebSocket handshake.
pub fn ws_user_id(query: &str) -> Option<i64> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("userId="))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
