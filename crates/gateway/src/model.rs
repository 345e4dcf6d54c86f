// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared domain types: session/message/campaign state machines and the row
//! structs the persistence gateways read and write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Session ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    QrPending,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QrPending => "qr_pending",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "connecting" => Self::Connecting,
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "failed" => Self::Failed,
            _ => Self::QrPending,
        }
    }
}

/// Free-form per-session settings. Unknown keys are preserved in the raw
/// JSON blob; these are the recognized ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_true", rename = "autoReplyEnabled")]
    pub auto_reply_enabled: bool,
    #[serde(default = "default_true", rename = "autoSaveContacts")]
    pub auto_save_contacts: bool,
    #[serde(default, rename = "customSystemPrompt")]
    pub custom_system_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { auto_reply_enabled: true, auto_save_contacts: true, custom_system_prompt: None }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: i64,
    pub session_id: String,
    pub user_id: i64,
    pub name: String,
    pub phone_number: Option<String>,
    pub status: SessionStatus,
    pub qr_code: Option<String>,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub ai_assistant_type: Option<String>,
    pub ai_config: Option<serde_json::Value>,
    pub webhook_url: Option<String>,
    pub settings: serde_json::Value,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionRow {
    /// Parse the recognized settings keys out of the raw blob.
    pub fn parsed_settings(&self) -> SessionSettings {
        serde_json::from_value(self.settings.clone()).unwrap_or_default()
    }

    /// Whether the persisted QR payload is still valid.
    pub fn qr_valid(&self, now: DateTime<Utc>) -> bool {
        match (&self.qr_code, self.qr_expires_at) {
            (Some(_), Some(expires)) => now < expires,
            _ => false,
        }
    }
}

// -- Message ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "outgoing" {
            Self::Outgoing
        } else {
            Self::Incoming
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
    Other,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Location => "location",
            Self::Contact => "contact",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "document" => Self::Document,
            "sticker" => Self::Sticker,
            "location" => Self::Location,
            "contact" => Self::Contact,
            _ => Self::Other,
        }
    }
}

/// Delivery status with a monotonic progression; `failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Rank used to enforce forward-only transitions.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        if *self == Self::Failed {
            return false;
        }
        next.rank() > self.rank()
    }
}

/// Which responder produced an auto-reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Openai,
    Rajaongkir,
    Manual,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Rajaongkir => "rajaongkir",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::Openai),
            "rajaongkir" => Some(Self::Rajaongkir),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: i64,
    pub message_id: String,
    pub direction: Direction,
    pub message_type: MessageKind,
    pub from_number: String,
    pub to_number: String,
    pub push_name: Option<String>,
    pub content: Option<String>,
    pub media_meta: Option<serde_json::Value>,
    pub status: MessageStatus,
    pub is_auto_reply: bool,
    pub reply_source: Option<ReplySource>,
    pub reply_context: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Contacts & groups --------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ContactRow {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub phone: String,
    pub display_name: Option<String>,
    pub push_name: Option<String>,
    pub is_business: bool,
    pub is_group: bool,
    pub metadata: serde_json::Value,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupRow {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub group_jid: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_jid: Option<String>,
    pub participant_count: i64,
    pub admin_count: i64,
    pub is_announce: bool,
    pub is_locked: bool,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupMemberRow {
    pub id: i64,
    pub group_id: i64,
    pub participant_jid: String,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub push_name: Option<String>,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub is_lid: bool,
}

// -- Rate bucket --------------------------------------------------------------

/// Per-session send accounting. One row per session.
#[derive(Debug, Clone, Serialize)]
pub struct RateBucket {
    pub session_id: i64,
    pub messages_last_hour: u32,
    pub messages_today: u32,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

// -- Broadcast ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }

    /// Cancellation is permitted only before the campaign reaches a
    /// terminal state.
    pub fn cancellable(&self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled | Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }
}

/// Message template for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, rename = "mediaUrl", skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignRow {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub name: String,
    pub template: Template,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub batch_size: i64,
    pub batch_delay_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl CampaignRow {
    pub fn pending(&self) -> i64 {
        (self.total - self.sent - self.failed).max(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientRow {
    pub id: i64,
    pub campaign_id: i64,
    pub phone: String,
    pub name: Option<String>,
    pub status: RecipientStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

// -- Scraping -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    InProgress,
    Completed,
    Failed,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapingLogRow {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub kind: String,
    pub status: ScrapeStatus,
    pub total: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

// -- Conversations ------------------------------------------------------------

/// Per-conversation ledger row used for human-agent routing.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRow {
    pub id: i64,
    pub session_id: i64,
    pub phone: String,
    pub human_agent_id: Option<i64>,
    pub last_message_at: Option<DateTime<Utc>>,
}

// -- Auto-reply rules ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "exact" => Self::Exact,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "regex" => Self::Regex,
            _ => Self::Contains,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleRow {
    pub id: i64,
    pub session_id: i64,
    pub pattern: String,
    pub match_mode: MatchMode,
    pub reply: String,
    pub priority: i64,
    pub is_active: bool,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
