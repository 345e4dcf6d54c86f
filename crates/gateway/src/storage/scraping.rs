// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scraping audit log gateway. The log doubles as the quota/cooldown
//! source of truth: only `completed` rows count.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{ScrapeStatus, ScrapingLogRow};
use crate::storage::{parse_ts_opt, to_ts, Storage};

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<ScrapingLogRow> {
    let status: String = row.get("status")?;
    Ok(ScrapingLogRow {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        kind: row.get("kind")?,
        status: ScrapeStatus::parse(&status),
        total: row.get("total")?,
        started_at: parse_ts_opt(row.get("started_at")?).unwrap_or_else(Utc::now),
        finished_at: parse_ts_opt(row.get("finished_at")?),
        error: row.get("error")?,
    })
}

impl Storage {
    /// Append an `in_progress` audit row and return its id.
    pub fn start_scrape_log(
        &self,
        user_id: i64,
        session_id: i64,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, GatewayError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scraping_logs (user_id, session_id, kind, status, started_at)
             VALUES (?1, ?2, ?3, 'in_progress', ?4)",
            params![user_id, session_id, kind, to_ts(now)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn complete_scrape_log(
        &self,
        log_id: i64,
        total: i64,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE scraping_logs SET status = 'completed', total = ?1, finished_at = ?2
             WHERE id = ?3",
            params![total, to_ts(now), log_id],
        )?;
        Ok(())
    }

    pub fn fail_scrape_log(
        &self,
        log_id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE scraping_logs SET status = 'failed', error = ?1, finished_at = ?2
             WHERE id = ?3",
            params![error, to_ts(now), log_id],
        )?;
        Ok(())
    }

    /// Completed scrapes for (user, session) since the start of the given
    /// calendar day (UTC).
    pub fn scrapes_completed_today(
        &self,
        user_id: i64,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u32, GatewayError> {
        let day_start = now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now);
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scraping_logs
             WHERE user_id = ?1 AND session_id = ?2 AND status = 'completed'
               AND finished_at >= ?3",
            params![user_id, session_id, to_ts(day_start)],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as u32)
    }

    /// Finish time of the most recent completed scrape, if any.
    pub fn last_scrape_completed_at(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Option<DateTime<Utc>>, GatewayError> {
        let conn = self.conn();
        let finished: Option<String> = conn
            .query_row(
                "SELECT finished_at FROM scraping_logs
                 WHERE user_id = ?1 AND session_id = ?2 AND status = 'completed'
                 ORDER BY finished_at DESC LIMIT 1",
                params![user_id, session_id],
                |r| r.get(0),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(parse_ts_opt(finished))
    }

    pub fn list_scrape_logs(
        &self,
        user_id: i64,
        session_id: i64,
        limit: usize,
    ) -> Result<Vec<ScrapingLogRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM scraping_logs
             WHERE user_id = ?1 AND session_id = ?2 ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, session_id, limit as i64], log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
