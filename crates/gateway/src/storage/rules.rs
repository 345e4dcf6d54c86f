// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual auto-reply rule gateway. Rules are user-managed; the engine only
//! reads the active set in evaluation order.

use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{MatchMode, RuleRow};
use crate::storage::{to_ts, Storage};

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    let mode: String = row.get("match_mode")?;
    Ok(RuleRow {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        pattern: row.get("pattern")?,
        match_mode: MatchMode::parse(&mode),
        reply: row.get("reply")?,
        priority: row.get("priority")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

impl Storage {
    /// Active rules for a session in evaluation order: priority descending,
    /// then id ascending.
    pub fn active_rules(&self, session_id: i64) -> Result<Vec<RuleRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM auto_reply_rules
             WHERE session_id = ?1 AND is_active = 1
             ORDER BY priority DESC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], rule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_rule(
        &self,
        session_id: i64,
        pattern: &str,
        match_mode: MatchMode,
        reply: &str,
        priority: i64,
    ) -> Result<i64, GatewayError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO auto_reply_rules (session_id, pattern, match_mode, reply, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, pattern, match_mode.as_str(), reply, priority, to_ts(chrono::Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }
}
