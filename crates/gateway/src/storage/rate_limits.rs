// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate bucket gateway. One row per session, get-or-create then
//! conditional update; the storage mutex serializes concurrent senders.

use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::RateBucket;
use crate::storage::{parse_ts_opt, to_ts, Storage};

fn bucket_from_row(row: &Row<'_>) -> rusqlite::Result<RateBucket> {
    Ok(RateBucket {
        session_id: row.get("session_id")?,
        messages_last_hour: row.get::<_, i64>("messages_last_hour")?.max(0) as u32,
        messages_today: row.get::<_, i64>("messages_today")?.max(0) as u32,
        last_sent_at: parse_ts_opt(row.get("last_sent_at")?),
        cooldown_until: parse_ts_opt(row.get("cooldown_until")?),
    })
}

impl Storage {
    /// Fetch the bucket for a session, creating a zeroed row on first use.
    pub fn rate_bucket(&self, session_id: i64) -> Result<RateBucket, GatewayError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO whatsapp_rate_limits (session_id) VALUES (?1)",
            params![session_id],
        )?;
        let bucket = conn.query_row(
            "SELECT * FROM whatsapp_rate_limits WHERE session_id = ?1",
            params![session_id],
            bucket_from_row,
        )?;
        Ok(bucket)
    }

    /// Persist refreshed counters and cooldown state.
    pub fn save_rate_bucket(&self, bucket: &RateBucket) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE whatsapp_rate_limits
             SET messages_last_hour = ?1, messages_today = ?2,
                 last_sent_at = ?3, cooldown_until = ?4
             WHERE session_id = ?5",
            params![
                i64::from(bucket.messages_last_hour),
                i64::from(bucket.messages_today),
                bucket.last_sent_at.map(to_ts),
                bucket.cooldown_until.map(to_ts),
                bucket.session_id,
            ],
        )?;
        Ok(())
    }
}
