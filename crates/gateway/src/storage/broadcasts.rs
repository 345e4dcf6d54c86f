// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Campaign and recipient gateways. Creation writes the campaign and its
//! recipient list in one transaction; counter updates keep
//! `sent + failed + pending = total` observable at every point.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::GatewayError;
use crate::model::{CampaignRow, CampaignStatus, MessageKind, RecipientRow, RecipientStatus, Template};
use crate::storage::{parse_ts_opt, to_ts, Storage};

/// Fields for a new campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub user_id: i64,
    pub session_id: i64,
    pub name: String,
    pub template: Template,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub batch_size: i64,
    pub batch_delay_ms: i64,
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<CampaignRow> {
    let status: String = row.get("status")?;
    let template_type: String = row.get("template_type")?;
    let variables: Option<String> = row.get("variables")?;
    Ok(CampaignRow {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        name: row.get("name")?,
        template: Template {
            kind: MessageKind::parse(&template_type),
            content: row.get("content")?,
            media_url: row.get("media_url")?,
            caption: row.get("caption")?,
            variables: variables.and_then(|s| serde_json::from_str(&s).ok()),
        },
        status: CampaignStatus::parse(&status),
        scheduled_at: parse_ts_opt(row.get("scheduled_at")?),
        started_at: parse_ts_opt(row.get("started_at")?),
        completed_at: parse_ts_opt(row.get("completed_at")?),
        total: row.get("total")?,
        sent: row.get("sent")?,
        failed: row.get("failed")?,
        batch_size: row.get("batch_size")?,
        batch_delay_ms: row.get("batch_delay_ms")?,
        created_at: parse_ts_opt(row.get("created_at")?).unwrap_or_else(Utc::now),
    })
}

fn recipient_from_row(row: &Row<'_>) -> rusqlite::Result<RecipientRow> {
    let status: String = row.get("status")?;
    Ok(RecipientRow {
        id: row.get("id")?,
        campaign_id: row.get("campaign_id")?,
        phone: row.get("phone")?,
        name: row.get("name")?,
        status: RecipientStatus::parse(&status),
        sent_at: parse_ts_opt(row.get("sent_at")?),
        error: row.get("error")?,
    })
}

impl Storage {
    /// Persist a campaign and its recipients in one transaction.
    /// Duplicate phones collapse onto the (campaign, phone) key.
    pub fn create_campaign(
        &self,
        new: NewCampaign,
        recipients: &[(String, Option<String>)],
    ) -> Result<CampaignRow, GatewayError> {
        let now = to_ts(Utc::now());
        let status =
            if new.scheduled_at.is_some() { CampaignStatus::Scheduled } else { CampaignStatus::Draft };
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO broadcast_campaigns
                (user_id, session_id, name, template_type, content, media_url, caption,
                 variables, status, scheduled_at, batch_size, batch_delay_ms,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                new.user_id,
                new.session_id,
                new.name,
                new.template.kind.as_str(),
                new.template.content,
                new.template.media_url,
                new.template.caption,
                new.template.variables.as_ref().map(|v| v.to_string()),
                status.as_str(),
                new.scheduled_at.map(to_ts),
                new.batch_size,
                new.batch_delay_ms,
                now,
            ],
        )?;
        let campaign_id = tx.last_insert_rowid();
        for (phone, name) in recipients {
            tx.execute(
                "INSERT OR IGNORE INTO broadcast_recipients (campaign_id, phone, name)
                 VALUES (?1, ?2, ?3)",
                params![campaign_id, phone, name],
            )?;
        }
        tx.execute(
            "UPDATE broadcast_campaigns SET total =
                (SELECT COUNT(*) FROM broadcast_recipients WHERE campaign_id = ?1)
             WHERE id = ?1",
            params![campaign_id],
        )?;
        tx.commit()?;

        let row = conn.query_row(
            "SELECT * FROM broadcast_campaigns WHERE id = ?1",
            params![campaign_id],
            campaign_from_row,
        )?;
        Ok(row)
    }

    pub fn campaign_by_id(&self, id: i64) -> Result<Option<CampaignRow>, GatewayError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM broadcast_campaigns WHERE id = ?1",
            params![id],
            campaign_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    /// Resolve a campaign and verify ownership.
    pub fn campaign_owned(&self, id: i64, user_id: i64) -> Result<CampaignRow, GatewayError> {
        let row = self
            .campaign_by_id(id)?
            .ok_or_else(|| GatewayError::not_found(format!("campaign {id} not found")))?;
        if row.user_id != user_id {
            return Err(GatewayError::forbidden("campaign belongs to another user"));
        }
        Ok(row)
    }

    pub fn list_campaigns(
        &self,
        user_id: i64,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<CampaignRow>, GatewayError> {
        let conn = self.conn();
        let mut rows = Vec::new();
        match status {
            Some(s) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM broadcast_campaigns
                     WHERE user_id = ?1 AND status = ?2 ORDER BY id DESC",
                )?;
                for row in stmt.query_map(params![user_id, s.as_str()], campaign_from_row)? {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM broadcast_campaigns WHERE user_id = ?1 ORDER BY id DESC",
                )?;
                for row in stmt.query_map(params![user_id], campaign_from_row)? {
                    rows.push(row?);
                }
            }
        }
        Ok(rows)
    }

    /// Transition campaign status, stamping started/completed timestamps.
    pub fn set_campaign_status(
        &self,
        id: i64,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let ts = to_ts(now);
        let conn = self.conn();
        match status {
            CampaignStatus::Processing => {
                conn.execute(
                    "UPDATE broadcast_campaigns
                     SET status = ?1, started_at = COALESCE(started_at, ?2), updated_at = ?2
                     WHERE id = ?3",
                    params![status.as_str(), ts, id],
                )?;
            }
            CampaignStatus::Completed | CampaignStatus::Failed | CampaignStatus::Cancelled => {
                conn.execute(
                    "UPDATE broadcast_campaigns
                     SET status = ?1, completed_at = ?2, updated_at = ?2
                     WHERE id = ?3",
                    params![status.as_str(), ts, id],
                )?;
            }
            _ => {
                conn.execute(
                    "UPDATE broadcast_campaigns SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), ts, id],
                )?;
            }
        }
        Ok(())
    }

    /// Current status only — the executor polls this to observe
    /// cancellation at batch boundaries.
    pub fn campaign_status(&self, id: i64) -> Result<CampaignStatus, GatewayError> {
        let conn = self.conn();
        let status: String = conn.query_row(
            "SELECT status FROM broadcast_campaigns WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(CampaignStatus::parse(&status))
    }

    /// Pending recipients in stable id order.
    pub fn pending_recipients(&self, campaign_id: i64) -> Result<Vec<RecipientRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM broadcast_recipients
             WHERE campaign_id = ?1 AND status = 'pending' ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![campaign_id], recipient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_recipients(&self, campaign_id: i64) -> Result<Vec<RecipientRow>, GatewayError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM broadcast_recipients WHERE campaign_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![campaign_id], recipient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark one recipient sent and bump the campaign counter, atomically.
    pub fn mark_recipient_sent(
        &self,
        recipient_id: i64,
        campaign_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let ts = to_ts(now);
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE broadcast_recipients SET status = 'sent', sent_at = ?1 WHERE id = ?2",
            params![ts, recipient_id],
        )?;
        tx.execute(
            "UPDATE broadcast_campaigns SET sent = sent + 1, updated_at = ?1 WHERE id = ?2",
            params![ts, campaign_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Mark one recipient failed with the error text and bump the counter.
    pub fn mark_recipient_failed(
        &self,
        recipient_id: i64,
        campaign_id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let ts = to_ts(now);
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE broadcast_recipients SET status = 'failed', error = ?1 WHERE id = ?2",
            params![error, recipient_id],
        )?;
        tx.execute(
            "UPDATE broadcast_campaigns SET failed = failed + 1, updated_at = ?1 WHERE id = ?2",
            params![ts, campaign_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "broadcasts_tests.rs"]
mod tests;
