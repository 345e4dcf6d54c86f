// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contact gateway. Upserts merge by preferring non-null new values and
//! never overwrite a human-assigned display name.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::ContactRow;
use crate::storage::{parse_ts_opt, to_ts, Storage};

/// Fields for a contact upsert.
#[derive(Debug, Clone, Default)]
pub struct ContactUpsert {
    pub phone: String,
    pub display_name: Option<String>,
    pub push_name: Option<String>,
    pub is_business: bool,
    pub is_group: bool,
    pub metadata: Option<serde_json::Value>,
    pub last_message_at: Option<DateTime<Utc>>,
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<ContactRow> {
    let metadata: String = row.get("metadata")?;
    Ok(ContactRow {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        phone: row.get("phone")?,
        display_name: row.get("display_name")?,
        push_name: row.get("push_name")?,
        is_business: row.get::<_, i64>("is_business")? != 0,
        is_group: row.get::<_, i64>("is_group")? != 0,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        last_message_at: parse_ts_opt(row.get("last_message_at")?),
    })
}

impl Storage {
    /// Insert or merge a contact keyed by (user, session, phone).
    ///
    /// `display_name` only fills a NULL column — a name the user assigned
    /// by hand is never clobbered by scraped or pushed data.
    pub fn upsert_contact(
        &self,
        user_id: i64,
        session_id: i64,
        up: ContactUpsert,
    ) -> Result<(), GatewayError> {
        let now = to_ts(Utc::now());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO whatsapp_contacts
                (user_id, session_id, phone, display_name, push_name, is_business,
                 is_group, metadata, last_message_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(user_id, session_id, phone) DO UPDATE SET
                display_name = COALESCE(whatsapp_contacts.display_name, excluded.display_name),
                push_name = COALESCE(excluded.push_name, whatsapp_contacts.push_name),
                is_business = MAX(whatsapp_contacts.is_business, excluded.is_business),
                is_group = MAX(whatsapp_contacts.is_group, excluded.is_group),
                metadata = CASE WHEN excluded.metadata != '{}'
                                THEN excluded.metadata
                                ELSE whatsapp_contacts.metadata END,
                last_message_at = COALESCE(excluded.last_message_at, whatsapp_contacts.last_message_at),
                updated_at = excluded.updated_at",
            params![
                user_id,
                session_id,
                up.phone,
                up.display_name,
                up.push_name,
                up.is_business as i64,
                up.is_group as i64,
                up.metadata.unwrap_or_else(|| serde_json::json!({})).to_string(),
                up.last_message_at.map(to_ts),
                now,
            ],
        )?;
        Ok(())
    }

    /// Set a display name on behalf of the user. This is the one write
    /// allowed to replace an existing name.
    pub fn rename_contact(
        &self,
        user_id: i64,
        session_id: i64,
        phone: &str,
        display_name: &str,
    ) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_contacts SET display_name = ?1, updated_at = ?2
             WHERE user_id = ?3 AND session_id = ?4 AND phone = ?5",
            params![display_name, to_ts(Utc::now()), user_id, session_id, phone],
        )?;
        Ok(())
    }

    pub fn list_contacts(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Vec<ContactRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM whatsapp_contacts
             WHERE user_id = ?1 AND session_id = ?2 ORDER BY phone",
        )?;
        let rows = stmt
            .query_map(params![user_id, session_id], contact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn contact_by_phone(
        &self,
        user_id: i64,
        session_id: i64,
        phone: &str,
    ) -> Result<Option<ContactRow>, GatewayError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM whatsapp_contacts
             WHERE user_id = ?1 AND session_id = ?2 AND phone = ?3",
            params![user_id, session_id, phone],
            contact_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }
}

#[cfg(test)]
#[path = "contacts_tests.rs"]
mod tests;
