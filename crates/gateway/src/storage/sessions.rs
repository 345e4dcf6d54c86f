// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session row gateway.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{SessionRow, SessionStatus};
use crate::storage::{parse_ts_opt, to_ts, Storage};

/// Fields for a freshly created session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: String,
    pub user_id: i64,
    pub name: String,
    pub ai_assistant_type: Option<String>,
    pub ai_config: Option<serde_json::Value>,
    pub webhook_url: Option<String>,
    pub settings: Option<serde_json::Value>,
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    let settings_raw: String = row.get("settings")?;
    let ai_config_raw: Option<String> = row.get("ai_config")?;
    let status_raw: String = row.get("status")?;
    Ok(SessionRow {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        phone_number: row.get("phone_number")?,
        status: SessionStatus::parse(&status_raw),
        qr_code: row.get("qr_code")?,
        qr_expires_at: parse_ts_opt(row.get("qr_expires_at")?),
        ai_assistant_type: row.get("ai_assistant_type")?,
        ai_config: ai_config_raw.and_then(|s| serde_json::from_str(&s).ok()),
        webhook_url: row.get("webhook_url")?,
        settings: serde_json::from_str(&settings_raw).unwrap_or(serde_json::Value::Null),
        last_connected_at: parse_ts_opt(row.get("last_connected_at")?),
        last_disconnected_at: parse_ts_opt(row.get("last_disconnected_at")?),
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: parse_ts_opt(row.get("created_at")?).unwrap_or_else(Utc::now),
    })
}

const SELECT: &str = "SELECT * FROM whatsapp_sessions";

impl Storage {
    pub fn create_session(&self, new: NewSession) -> Result<SessionRow, GatewayError> {
        let now = to_ts(Utc::now());
        let settings = new.settings.unwrap_or_else(|| serde_json::json!({}));
        let conn = self.conn();
        conn.execute(
            "INSERT INTO whatsapp_sessions
                (session_id, user_id, name, ai_assistant_type, ai_config, webhook_url,
                 settings, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'qr_pending', ?8, ?8)",
            params![
                new.session_id,
                new.user_id,
                new.name,
                new.ai_assistant_type,
                new.ai_config.map(|v| v.to_string()),
                new.webhook_url,
                settings.to_string(),
                now,
            ],
        )?;
        let row = conn.query_row(
            &format!("{SELECT} WHERE session_id = ?1"),
            params![new.session_id],
            session_from_row,
        )?;
        Ok(row)
    }

    pub fn session_by_external(&self, session_id: &str) -> Result<Option<SessionRow>, GatewayError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("{SELECT} WHERE session_id = ?1 AND deleted_at IS NULL"),
                params![session_id],
                session_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    /// Count of non-deleted active sessions across all users (health
    /// endpoint).
    pub fn list_sessions_count(&self) -> Result<usize, GatewayError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM whatsapp_sessions WHERE deleted_at IS NULL AND is_active = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    pub fn session_by_db_id(&self, id: i64) -> Result<Option<SessionRow>, GatewayError> {
        let conn = self.conn();
        conn.query_row(&format!("{SELECT} WHERE id = ?1"), params![id], session_from_row)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    /// Resolve a session and verify ownership. Missing rows are
    /// `not_found`; a user-id mismatch is `forbidden`.
    pub fn session_owned(&self, session_id: &str, user_id: i64) -> Result<SessionRow, GatewayError> {
        let row = self
            .session_by_external(session_id)?
            .ok_or_else(|| GatewayError::not_found(format!("session {session_id} not found")))?;
        if row.user_id != user_id {
            return Err(GatewayError::forbidden("session belongs to another user"));
        }
        Ok(row)
    }

    pub fn list_sessions(&self, user_id: i64, active_only: bool) -> Result<Vec<SessionRow>, GatewayError> {
        let conn = self.conn();
        let sql = if active_only {
            format!("{SELECT} WHERE user_id = ?1 AND deleted_at IS NULL AND is_active = 1 ORDER BY id")
        } else {
            format!("{SELECT} WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY id")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Update session status, stamping the matching connected/disconnected
    /// timestamp. Every state change goes through here *before* the live
    /// event is published.
    pub fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let ts = to_ts(now);
        let conn = self.conn();
        match status {
            SessionStatus::Connected => {
                conn.execute(
                    "UPDATE whatsapp_sessions
                     SET status = ?1, last_connected_at = ?2, updated_at = ?2
                     WHERE session_id = ?3",
                    params![status.as_str(), ts, session_id],
                )?;
            }
            SessionStatus::Disconnected | SessionStatus::Failed => {
                conn.execute(
                    "UPDATE whatsapp_sessions
                     SET status = ?1, last_disconnected_at = ?2, updated_at = ?2
                     WHERE session_id = ?3",
                    params![status.as_str(), ts, session_id],
                )?;
            }
            _ => {
                conn.execute(
                    "UPDATE whatsapp_sessions SET status = ?1, updated_at = ?2 WHERE session_id = ?3",
                    params![status.as_str(), ts, session_id],
                )?;
            }
        }
        Ok(())
    }

    pub fn set_session_phone(&self, session_id: &str, phone: &str) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_sessions SET phone_number = ?1, updated_at = ?2 WHERE session_id = ?3",
            params![phone, to_ts(Utc::now()), session_id],
        )?;
        Ok(())
    }

    pub fn set_session_qr(
        &self,
        session_id: &str,
        qr_code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_sessions
             SET qr_code = ?1, qr_expires_at = ?2, updated_at = ?3
             WHERE session_id = ?4",
            params![qr_code, to_ts(expires_at), to_ts(Utc::now()), session_id],
        )?;
        Ok(())
    }

    pub fn clear_session_qr(&self, session_id: &str) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_sessions
             SET qr_code = NULL, qr_expires_at = NULL, updated_at = ?1
             WHERE session_id = ?2",
            params![to_ts(Utc::now()), session_id],
        )?;
        Ok(())
    }

    pub fn soft_delete_session(&self, session_id: &str) -> Result<(), GatewayError> {
        let now = to_ts(Utc::now());
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_sessions
             SET deleted_at = ?1, is_active = 0, updated_at = ?1
             WHERE session_id = ?2",
            params![now, session_id],
        )?;
        Ok(())
    }
}
