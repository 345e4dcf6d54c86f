// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session webhook forwarding. Sessions that configure a webhook URL
//! get every inbound message POSTed to it, fire-and-forget with a single
//! retry.

use std::time::Duration;

use crate::model::MessageRow;

pub struct WebhookForwarder {
    http: reqwest::Client,
}

impl WebhookForwarder {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Deliver an inbound message to the session's webhook in the
    /// background. Failures are logged, retried once, then dropped.
    pub fn forward(&self, url: &str, message: &MessageRow) {
        let http = self.http.clone();
        let url = url.to_owned();
        let payload = serde_json::json!({
            "event": "message:incoming",
            "message": message,
        });
        tokio::spawn(async move {
            for attempt in 1..=2u8 {
                match http.post(&url).json(&payload).send().await {
                    Ok(resp) if resp.status().is_success() => return,
                    Ok(resp) => {
                        tracing::warn!(url = %url, status = %resp.status(), attempt, "webhook delivery rejected");
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, err = %e, attempt, "webhook delivery failed");
                    }
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });
    }
}

impl Default for WebhookForwarder {
    fn default() -> Self {
        Self::new()
    }
}
