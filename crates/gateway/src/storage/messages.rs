// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message row gateway. `message_id` is the idempotency key: re-inserting
//! an existing id is a no-op, and status transitions only ever advance.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{Direction, MessageKind, MessageRow, MessageStatus, ReplySource};
use crate::storage::{parse_ts_opt, to_ts, Storage};

/// Fields for a new message row.
#[derive(Debug, Clone)]
pub struct NewMessage {
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
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let direction: String = row.get("direction")?;
    let message_type: String = row.get("message_type")?;
    let status: String = row.get("status")?;
    let reply_source: Option<String> = row.get("reply_source")?;
    let media_meta: Option<String> = row.get("media_meta")?;
    let reply_context: Option<String> = row.get("reply_context")?;
    Ok(MessageRow {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        message_id: row.get("message_id")?,
        direction: Direction::parse(&direction),
        message_type: MessageKind::parse(&message_type),
        from_number: row.get("from_number")?,
        to_number: row.get("to_number")?,
        push_name: row.get("push_name")?,
        content: row.get("content")?,
        media_meta: media_meta.and_then(|s| serde_json::from_str(&s).ok()),
        status: MessageStatus::parse(&status),
        is_auto_reply: row.get::<_, i64>("is_auto_reply")? != 0,
        reply_source: reply_source.as_deref().and_then(ReplySource::parse),
        reply_context: reply_context.and_then(|s| serde_json::from_str(&s).ok()),
        failure_reason: row.get("failure_reason")?,
        sent_at: parse_ts_opt(row.get("sent_at")?),
        delivered_at: parse_ts_opt(row.get("delivered_at")?),
        read_at: parse_ts_opt(row.get("read_at")?),
        created_at: parse_ts_opt(row.get("created_at")?).unwrap_or_else(Utc::now),
    })
}

impl Storage {
    /// Insert a message. Returns `None` when a row with the same external
    /// `message_id` already exists (at-most-once semantics).
    pub fn insert_message(&self, new: NewMessage) -> Result<Option<MessageRow>, GatewayError> {
        let now = Utc::now();
        let ts = to_ts(now);
        let delivered_at =
            (new.status == MessageStatus::Delivered).then(|| ts.clone());
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO whatsapp_messages
                (session_id, message_id, direction, message_type, from_number, to_number,
                 push_name, content, media_meta, status, is_auto_reply, reply_source,
                 reply_context, delivered_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                new.session_id,
                new.message_id,
                new.direction.as_str(),
                new.message_type.as_str(),
                new.from_number,
                new.to_number,
                new.push_name,
                new.content,
                new.media_meta.map(|v| v.to_string()),
                new.status.as_str(),
                new.is_auto_reply as i64,
                new.reply_source.map(|s| s.as_str()),
                new.reply_context.map(|v| v.to_string()),
                delivered_at,
                ts,
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        let row = conn.query_row(
            "SELECT * FROM whatsapp_messages WHERE message_id = ?1",
            params![new.message_id],
            message_from_row,
        )?;
        Ok(Some(row))
    }

    pub fn message_by_external(&self, message_id: &str) -> Result<Option<MessageRow>, GatewayError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM whatsapp_messages WHERE message_id = ?1",
            params![message_id],
            message_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    /// Advance a message's delivery status, stamping the matching
    /// timestamp. Regressions and transitions out of `failed` are ignored.
    pub fn advance_message_status(
        &self,
        message_id: &str,
        next: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        let conn = self.conn();
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM whatsapp_messages WHERE message_id = ?1",
                params![message_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(current) = current else { return Ok(false) };
        if !MessageStatus::parse(&current).can_advance_to(next) {
            return Ok(false);
        }
        let ts = to_ts(now);
        let stamp_column = match next {
            MessageStatus::Sent => Some("sent_at"),
            MessageStatus::Delivered => Some("delivered_at"),
            MessageStatus::Read => Some("read_at"),
            _ => None,
        };
        match stamp_column {
            Some(col) => {
                conn.execute(
                    &format!(
                        "UPDATE whatsapp_messages
                         SET status = ?1, {col} = COALESCE({col}, ?2)
                         WHERE message_id = ?3"
                    ),
                    params![next.as_str(), ts, message_id],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE whatsapp_messages SET status = ?1 WHERE message_id = ?2",
                    params![next.as_str(), message_id],
                )?;
            }
        }
        Ok(true)
    }

    /// Mark a message `failed` with a reason. Terminal.
    pub fn fail_message(&self, message_id: &str, reason: &str) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_messages
             SET status = 'failed', failure_reason = ?1
             WHERE message_id = ?2 AND status != 'failed'",
            params![reason, message_id],
        )?;
        Ok(())
    }

    /// Recent two-way history with one counterparty, oldest first.
    /// Used for the AI responder's context window.
    pub fn conversation_history(
        &self,
        session_id: i64,
        phone: &str,
        limit: usize,
    ) -> Result<Vec<MessageRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM whatsapp_messages
             WHERE session_id = ?1 AND (from_number = ?2 OR to_number = ?2)
             ORDER BY id DESC LIMIT ?3",
        )?;
        let mut rows = stmt
            .query_map(params![session_id, phone, limit as i64], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn list_messages(
        &self,
        session_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM whatsapp_messages
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
