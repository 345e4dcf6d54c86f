// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation ledger gateway. The conversation table is shared with the
//! external HTTP-facing agent subsystem; the core creates/updates rows on
//! inbound traffic and honors `human_agent_id` as the skip-auto-reply
//! signal.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{ConversationRow, Direction};
use crate::storage::{parse_ts_opt, to_ts, Storage};

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        phone: row.get("phone")?,
        human_agent_id: row.get("human_agent_id")?,
        last_message_at: parse_ts_opt(row.get("last_message_at")?),
    })
}

impl Storage {
    /// Create or touch the conversation for (session, phone) and return it.
    pub fn upsert_conversation(
        &self,
        session_id: i64,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<ConversationRow, GatewayError> {
        let ts = to_ts(now);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO conversations (session_id, phone, last_message_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?3)
             ON CONFLICT(session_id, phone) DO UPDATE SET
                last_message_at = excluded.last_message_at,
                updated_at = excluded.updated_at",
            params![session_id, phone, ts],
        )?;
        let row = conn.query_row(
            "SELECT * FROM conversations WHERE session_id = ?1 AND phone = ?2",
            params![session_id, phone],
            conversation_from_row,
        )?;
        Ok(row)
    }

    /// Append one line to the conversation's child table.
    pub fn append_conversation_message(
        &self,
        conversation_id: i64,
        direction: Direction,
        content: &str,
    ) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO conversation_messages (conversation_id, direction, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, direction.as_str(), content, to_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Assign or clear a human agent (used by tests and the collaborator
    /// subsystem's writes).
    pub fn assign_human_agent(
        &self,
        session_id: i64,
        phone: &str,
        agent_id: Option<i64>,
    ) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE conversations SET human_agent_id = ?1, updated_at = ?2
             WHERE session_id = ?3 AND phone = ?4",
            params![agent_id, to_ts(Utc::now()), session_id, phone],
        )?;
        Ok(())
    }
}
