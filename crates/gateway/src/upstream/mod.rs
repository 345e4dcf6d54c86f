// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream chat-network provider seam. The real protocol library is
//! opaque; the gateway only sees these traits and event types. Each
//! connection attempt yields a command half (`ChatTransport`) plus an event
//! stream the session driver consumes.

pub mod lifecycle;
pub mod qr;
pub mod sidecar;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::model::MessageKind;

// -- Errors -------------------------------------------------------------------

/// Error from a transport operation.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
    /// Set when the operation failed because the socket is gone.
    pub connection_closed: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), connection_closed: false }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self { message: message.into(), connection_closed: true }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

// -- Close reasons ------------------------------------------------------------

/// Why the upstream socket closed. Fatal reasons destroy credentials and
/// end the session; transient ones drive reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    LoggedOut,
    BadSession,
    Replaced,
    Unauthorized(u16),
    TimedOut,
    ConnectionLost,
    ConnectionClosed,
    Other(String),
}

impl CloseReason {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::LoggedOut | Self::BadSession | Self::Replaced => true,
            Self::Unauthorized(code) => matches!(code, 401 | 403 | 500),
            Self::TimedOut | Self::ConnectionLost | Self::ConnectionClosed | Self::Other(_) => {
                false
            }
        }
    }

    /// User-facing explanation carried on `session:connection_failed`.
    pub fn user_message(&self) -> String {
        match self {
            Self::LoggedOut => "Device was logged out. Scan the QR code to pair again.".to_owned(),
            Self::BadSession => {
                "Stored session is invalid. Scan the QR code to pair again.".to_owned()
            }
            Self::Replaced => {
                "Session was opened on another device. Scan the QR code to pair again.".to_owned()
            }
            Self::Unauthorized(code) => format!("Authentication rejected by server ({code})."),
            Self::TimedOut => "Connection timed out.".to_owned(),
            Self::ConnectionLost => "Connection lost.".to_owned(),
            Self::ConnectionClosed => "Connection closed.".to_owned(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

// -- Inbound event types ------------------------------------------------------

/// Whether a message upsert arrived as a live notification or a history
/// resync append. The two get different freshness windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Notify,
    Append,
}

/// A raw inbound message event from the provider.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub remote_jid: String,
    pub from_me: bool,
    pub participant: Option<String>,
    pub message_id: String,
    pub push_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub media: Option<serde_json::Value>,
}

/// Key identifying a message for read-marking.
#[derive(Debug, Clone)]
pub struct MessageKey {
    pub remote_jid: String,
    pub message_id: String,
    pub participant: Option<String>,
}

/// Presence states the gateway simulates while composing replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Paused,
}

/// Events the provider pushes to the session driver.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A fresh pairing QR payload was issued.
    Qr { payload: String },
    /// Pairing completed; the authenticated phone number is known.
    PairingSuccess { phone: String },
    /// A message upsert (live or history).
    MessageUpsert { kind: UpsertKind, message: InboundMessage },
    /// Delivery status change for a previously sent message.
    MessageStatus { message_id: String, status: crate::model::MessageStatus },
    /// The socket closed.
    Closed { reason: CloseReason },
}

// -- Directory types (scraper) ------------------------------------------------

/// One entry from the provider's contact store or chat list.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryEntry {
    pub jid: String,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub push_name: Option<String>,
    pub is_business: bool,
    pub is_group: bool,
}

/// Group metadata from the provider.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupInfo {
    pub jid: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_jid: Option<String>,
    pub is_announce: bool,
    pub is_locked: bool,
}

/// One participant of a group.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantInfo {
    pub jid: String,
    pub push_name: Option<String>,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

/// Receipt returned by the provider for an accepted send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

// -- Traits -------------------------------------------------------------------

/// Command half of a live connection. All methods suspend on the wire.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, TransportError>;

    async fn send_image(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, TransportError>;

    async fn send_document(
        &self,
        to: &str,
        url: &str,
        filename: &str,
        mimetype: &str,
    ) -> Result<SendReceipt, TransportError>;

    async fn send_presence(&self, to: &str, presence: Presence) -> Result<(), TransportError>;

    async fn mark_read(&self, key: &MessageKey) -> Result<(), TransportError>;

    /// Provider-side contact store.
    async fn contacts(&self) -> Result<Vec<DirectoryEntry>, TransportError>;

    /// Open chat list (covers counterparties missing from the store).
    async fn chats(&self) -> Result<Vec<DirectoryEntry>, TransportError>;

    async fn groups(&self) -> Result<Vec<GroupInfo>, TransportError>;

    async fn group_participants(
        &self,
        group_jid: &str,
    ) -> Result<Vec<ParticipantInfo>, TransportError>;

    /// Batched LID-to-phone resolution. Keys are the LID identifiers that
    /// resolved; unresolved ones are simply absent.
    async fn resolve_lids(
        &self,
        lids: &[String],
    ) -> Result<HashMap<String, String>, TransportError>;

    /// Tell the server to unlink this device.
    async fn logout(&self) -> Result<(), TransportError>;

    /// Close the socket without unlinking.
    async fn close(&self);
}

/// Handle to one connection attempt: the command half plus the event
/// stream the session driver consumes.
pub struct TransportLink {
    pub transport: Arc<dyn ChatTransport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens connections for sessions. The production implementation wraps the
/// vendor protocol library; tests script a mock.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a connection for `session_id`, loading or initializing on-disk
    /// credentials under `auth_dir`.
    async fn connect(
        &self,
        session_id: &str,
        auth_dir: &Path,
    ) -> Result<TransportLink, TransportError>;
}

#[cfg(test)]
#[path = "close_reason_tests.rs"]
mod tests;
