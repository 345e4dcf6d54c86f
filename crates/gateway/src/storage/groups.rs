// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group and group-member gateways. Member upserts and the derived
//! participant count are committed in one transaction.

use chrono::Utc;
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{GroupMemberRow, GroupRow};
use crate::storage::{to_ts, Storage};

/// Fields for a group upsert.
#[derive(Debug, Clone, Default)]
pub struct GroupUpsert {
    pub group_jid: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_jid: Option<String>,
    pub participant_count: i64,
    pub admin_count: i64,
    pub is_announce: bool,
    pub is_locked: bool,
    pub metadata: Option<serde_json::Value>,
}

/// Fields for a group-member upsert.
#[derive(Debug, Clone, Default)]
pub struct MemberUpsert {
    pub participant_jid: String,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub push_name: Option<String>,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub is_lid: bool,
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    let metadata: String = row.get("metadata")?;
    Ok(GroupRow {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        group_jid: row.get("group_jid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        owner_jid: row.get("owner_jid")?,
        participant_count: row.get("participant_count")?,
        admin_count: row.get("admin_count")?,
        is_announce: row.get::<_, i64>("is_announce")? != 0,
        is_locked: row.get::<_, i64>("is_locked")? != 0,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<GroupMemberRow> {
    Ok(GroupMemberRow {
        id: row.get("id")?,
        group_id: row.get("group_id")?,
        participant_jid: row.get("participant_jid")?,
        phone: row.get("phone")?,
        display_name: row.get("display_name")?,
        push_name: row.get("push_name")?,
        is_admin: row.get::<_, i64>("is_admin")? != 0,
        is_super_admin: row.get::<_, i64>("is_super_admin")? != 0,
        is_lid: row.get::<_, i64>("is_lid")? != 0,
    })
}

impl Storage {
    /// Insert or update a group keyed by (user, session, groupJid).
    /// Returns the internal group id.
    pub fn upsert_group(
        &self,
        user_id: i64,
        session_id: i64,
        up: GroupUpsert,
    ) -> Result<i64, GatewayError> {
        let now = to_ts(Utc::now());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO whatsapp_groups
                (user_id, session_id, group_jid, name, description, owner_jid,
                 participant_count, admin_count, is_announce, is_locked, metadata,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(user_id, session_id, group_jid) DO UPDATE SET
                name = excluded.name,
                description = COALESCE(excluded.description, whatsapp_groups.description),
                owner_jid = COALESCE(excluded.owner_jid, whatsapp_groups.owner_jid),
                participant_count = excluded.participant_count,
                admin_count = excluded.admin_count,
                is_announce = excluded.is_announce,
                is_locked = excluded.is_locked,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                user_id,
                session_id,
                up.group_jid,
                up.name,
                up.description,
                up.owner_jid,
                up.participant_count,
                up.admin_count,
                up.is_announce as i64,
                up.is_locked as i64,
                up.metadata.unwrap_or_else(|| serde_json::json!({})).to_string(),
                now,
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM whatsapp_groups
             WHERE user_id = ?1 AND session_id = ?2 AND group_jid = ?3",
            params![user_id, session_id, up.group_jid],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Upsert one member and refresh the parent group's participant and
    /// admin counts, all in one transaction.
    pub fn upsert_group_member(
        &self,
        group_id: i64,
        up: MemberUpsert,
    ) -> Result<(), GatewayError> {
        let now = to_ts(Utc::now());
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO whatsapp_group_members
                (group_id, participant_jid, phone, display_name, push_name,
                 is_admin, is_super_admin, is_lid, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(group_id, participant_jid) DO UPDATE SET
                phone = COALESCE(excluded.phone, whatsapp_group_members.phone),
                display_name = COALESCE(excluded.display_name, whatsapp_group_members.display_name),
                push_name = COALESCE(excluded.push_name, whatsapp_group_members.push_name),
                is_admin = excluded.is_admin,
                is_super_admin = excluded.is_super_admin,
                is_lid = excluded.is_lid,
                updated_at = excluded.updated_at",
            params![
                group_id,
                up.participant_jid,
                up.phone,
                up.display_name,
                up.push_name,
                up.is_admin as i64,
                up.is_super_admin as i64,
                up.is_lid as i64,
                now,
            ],
        )?;
        tx.execute(
            "UPDATE whatsapp_groups SET
                participant_count = (SELECT COUNT(*) FROM whatsapp_group_members WHERE group_id = ?1),
                admin_count = (SELECT COUNT(*) FROM whatsapp_group_members
                               WHERE group_id = ?1 AND (is_admin = 1 OR is_super_admin = 1)),
                updated_at = ?2
             WHERE id = ?1",
            params![group_id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_groups(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Vec<GroupRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM whatsapp_groups
             WHERE user_id = ?1 AND session_id = ?2 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![user_id, session_id], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn group_by_jid(
        &self,
        user_id: i64,
        session_id: i64,
        group_jid: &str,
    ) -> Result<Option<GroupRow>, GatewayError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM whatsapp_groups
             WHERE user_id = ?1 AND session_id = ?2 AND group_jid = ?3",
            params![user_id, session_id, group_jid],
            group_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    pub fn group_by_id(&self, group_id: i64) -> Result<Option<GroupRow>, GatewayError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM whatsapp_groups WHERE id = ?1",
            params![group_id],
            group_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    pub fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMemberRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM whatsapp_group_members WHERE group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![group_id], member_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "groups_tests.rs"]
mod tests;
