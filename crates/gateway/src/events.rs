// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live event fan-out. Every event is published once with its routing keys
//! (`user:<id>`, `session:<id>`, `broadcast:<id>`); WebSocket connections
//! filter the shared stream against their subscription set. Delivery is
//! best-effort and per-subscriber FIFO.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast;

use crate::model::{MessageRow, SessionStatus};

// -- Wire-format event types --------------------------------------------------

/// Server-initiated events, tagged with the colon-namespaced `type` the
/// WebSocket clients switch on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    #[serde(rename = "session:qr")]
    SessionQr { session: String, qr_code: String, expires_at: DateTime<Utc> },
    #[serde(rename = "session:connected")]
    SessionConnected { session: String, phone: String },
    #[serde(rename = "session:disconnected")]
    SessionDisconnected { session: String, reason: String },
    #[serde(rename = "session:connection_failed")]
    SessionConnectionFailed { session: String, reason: String },
    #[serde(rename = "session:status")]
    SessionStatus { session: String, status: SessionStatus },
    #[serde(rename = "message:incoming")]
    MessageIncoming { session: String, message: MessageRow },
    #[serde(rename = "message:sent")]
    MessageSent { session: String, message: MessageRow },
    #[serde(rename = "message:status")]
    MessageStatus { session: String, message_id: String, status: crate::model::MessageStatus },
    #[serde(rename = "broadcast:started")]
    BroadcastStarted { campaign: i64, total: i64 },
    #[serde(rename = "broadcast:progress")]
    BroadcastProgress { campaign: i64, sent: i64, failed: i64, total: i64 },
    #[serde(rename = "broadcast:completed")]
    BroadcastCompleted { campaign: i64, sent: i64, failed: i64, total: i64 },
    #[serde(rename = "broadcast:failed")]
    BroadcastFailed { campaign: i64, error: String },
}

/// An event together with the routing keys it should reach.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub keys: Vec<String>,
    pub event: GatewayEvent,
}

pub fn user_key(user_id: i64) -> String {
    format!("user:{user_id}")
}

pub fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

pub fn broadcast_key(campaign_id: i64) -> String {
    format!("broadcast:{campaign_id}")
}

// -- Hub ----------------------------------------------------------------------

/// Process-wide fan-out hub over a single broadcast channel.
pub struct EventHub {
    tx: broadcast::Sender<Envelope>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(512);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Publish to an explicit key set. Send errors (no subscribers) are
    /// ignored.
    pub fn publish(&self, keys: Vec<String>, event: GatewayEvent) {
        let _ = self.tx.send(Envelope { keys, event });
    }

    /// Publish a session-scoped event to the owning user's channel and the
    /// session's channel.
    pub fn publish_session(&self, user_id: i64, session_id: &str, event: GatewayEvent) {
        self.publish(vec![user_key(user_id), session_key(session_id)], event);
    }

    /// Publish a broadcast-scoped event to the owning user's channel and
    /// the campaign's channel.
    pub fn publish_broadcast(&self, user_id: i64, campaign_id: i64, event: GatewayEvent) {
        self.publish(vec![user_key(user_id), broadcast_key(campaign_id)], event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

// -- Subscription filtering ---------------------------------------------------

/// Per-connection subscription set. A connection always carries its own
/// `user:<id>` key; session and broadcast keys come and go with the
/// client's subscribe/unsubscribe messages.
#[derive(Debug)]
pub struct SubscriptionSet {
    keys: HashSet<String>,
}

impl SubscriptionSet {
    pub fn for_user(user_id: i64) -> Self {
        let mut keys = HashSet::new();
        keys.insert(user_key(user_id));
        Self { keys }
    }

    pub fn add(&mut self, key: String) {
        self.keys.insert(key);
    }

    pub fn remove(&mut self, key: &str) {
        self.keys.remove(key);
    }

    /// Whether this connection should receive the envelope.
    pub fn wants(&self, envelope: &Envelope) -> bool {
        envelope.keys.iter().any(|k| self.keys.contains(k))
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
