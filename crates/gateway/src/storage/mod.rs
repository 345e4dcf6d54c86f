// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence gateways. One SQLite handle shared behind a mutex; each
//! aggregate gets its own submodule of `impl Storage` methods. All durable
//! rows are owned here — components never share in-memory state except
//! through these interfaces.

pub mod broadcasts;
pub mod contacts;
pub mod conversations;
pub mod groups;
pub mod messages;
pub mod rate_limits;
pub mod rules;
pub mod scraping;
pub mod sessions;

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::GatewayError;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the database at `path` and run the idempotent
    /// schema bootstrap.
    pub fn open(path: &str) -> Result<Self, GatewayError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GatewayError::internal(format!("create db dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn: Mutex::new(conn) };
        storage.migrate()?;
        Ok(storage)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, GatewayError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn: Mutex::new(conn) };
        storage.migrate()?;
        Ok(storage)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS whatsapp_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                phone_number TEXT,
                status TEXT NOT NULL DEFAULT 'qr_pending',
                qr_code TEXT,
                qr_expires_at TEXT,
                ai_assistant_type TEXT,
                ai_config TEXT,
                webhook_url TEXT,
                settings TEXT NOT NULL DEFAULT '{}',
                last_connected_at TEXT,
                last_disconnected_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON whatsapp_sessions(user_id);

            CREATE TABLE IF NOT EXISTS whatsapp_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                message_id TEXT NOT NULL UNIQUE,
                direction TEXT NOT NULL,
                message_type TEXT NOT NULL,
                from_number TEXT NOT NULL,
                to_number TEXT NOT NULL,
                push_name TEXT,
                content TEXT,
                media_meta TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                is_auto_reply INTEGER NOT NULL DEFAULT 0,
                reply_source TEXT,
                reply_context TEXT,
                failure_reason TEXT,
                sent_at TEXT,
                delivered_at TEXT,
                read_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON whatsapp_messages(session_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON whatsapp_messages(session_id, from_number);

            CREATE TABLE IF NOT EXISTS whatsapp_contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                phone TEXT NOT NULL,
                display_name TEXT,
                push_name TEXT,
                is_business INTEGER NOT NULL DEFAULT 0,
                is_group INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                last_message_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, session_id, phone)
            );

            CREATE TABLE IF NOT EXISTS whatsapp_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                group_jid TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                description TEXT,
                owner_jid TEXT,
                participant_count INTEGER NOT NULL DEFAULT 0,
                admin_count INTEGER NOT NULL DEFAULT 0,
                is_announce INTEGER NOT NULL DEFAULT 0,
                is_locked INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, session_id, group_jid)
            );

            CREATE TABLE IF NOT EXISTS whatsapp_group_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES whatsapp_groups(id) ON DELETE CASCADE,
                participant_jid TEXT NOT NULL,
                phone TEXT,
                display_name TEXT,
                push_name TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_super_admin INTEGER NOT NULL DEFAULT 0,
                is_lid INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(group_id, participant_jid)
            );

            CREATE TABLE IF NOT EXISTS whatsapp_rate_limits (
                session_id INTEGER PRIMARY KEY REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                messages_last_hour INTEGER NOT NULL DEFAULT 0,
                messages_today INTEGER NOT NULL DEFAULT 0,
                last_sent_at TEXT,
                cooldown_until TEXT
            );

            CREATE TABLE IF NOT EXISTS broadcast_campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                template_type TEXT NOT NULL,
                content TEXT NOT NULL,
                media_url TEXT,
                caption TEXT,
                variables TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                scheduled_at TEXT,
                started_at TEXT,
                completed_at TEXT,
                total INTEGER NOT NULL DEFAULT 0,
                sent INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                batch_size INTEGER NOT NULL DEFAULT 20,
                batch_delay_ms INTEGER NOT NULL DEFAULT 60000,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_campaigns_user ON broadcast_campaigns(user_id, status);

            CREATE TABLE IF NOT EXISTS broadcast_recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL REFERENCES broadcast_campaigns(id) ON DELETE CASCADE,
                phone TEXT NOT NULL,
                name TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                sent_at TEXT,
                error TEXT,
                UNIQUE(campaign_id, phone)
            );
            CREATE INDEX IF NOT EXISTS idx_recipients_pending ON broadcast_recipients(campaign_id, status);

            CREATE TABLE IF NOT EXISTS scraping_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                kind TEXT NOT NULL DEFAULT 'contacts',
                status TEXT NOT NULL DEFAULT 'in_progress',
                total INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scraping_session ON scraping_logs(user_id, session_id, status);

            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                phone TEXT NOT NULL,
                human_agent_id INTEGER,
                last_message_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(session_id, phone)
            );

            CREATE TABLE IF NOT EXISTS conversation_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                direction TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auto_reply_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES whatsapp_sessions(id) ON DELETE CASCADE,
                pattern TEXT NOT NULL,
                match_mode TEXT NOT NULL DEFAULT 'contains',
                reply TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rules_session ON auto_reply_rules(session_id, is_active);",
        )?;
        Ok(())
    }
}

// -- Timestamp helpers --------------------------------------------------------

/// Serialize a timestamp the way every table stores it.
pub fn to_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

/// Parse a stored timestamp; invalid values surface as `None`.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Parse an optional stored timestamp column.
pub fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().and_then(parse_ts)
}
