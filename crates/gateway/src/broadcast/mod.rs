// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast executor: validated campaign creation, then one background
//! task per running campaign delivering the template recipient by
//! recipient with rate limiting, batching, progress events and
//! cancellation at batch boundaries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{EventHub, GatewayEvent};
use crate::inbound::jid::normalize_phone;
use crate::model::{CampaignRow, CampaignStatus, MessageKind, RecipientRow, Template};
use crate::ratelimit::RateLimiter;
use crate::session::SessionManager;
use crate::storage::broadcasts::NewCampaign;
use crate::storage::Storage;

const MAX_RECIPIENTS: usize = 10_000;
const PROGRESS_EVERY: i64 = 5;

/// One recipient as submitted by the caller.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RecipientInput {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub struct BroadcastEngine {
    storage: Arc<Storage>,
    hub: Arc<EventHub>,
    limiter: Arc<RateLimiter>,
    manager: Arc<SessionManager>,
    default_batch_size: i64,
    default_batch_delay_ms: i64,
    shutdown: CancellationToken,
}

impl BroadcastEngine {
    pub fn new(
        config: &GatewayConfig,
        storage: Arc<Storage>,
        hub: Arc<EventHub>,
        limiter: Arc<RateLimiter>,
        manager: Arc<SessionManager>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            storage,
            hub,
            limiter,
            manager,
            default_batch_size: i64::from(config.broadcast_batch_size),
            default_batch_delay_ms: config.broadcast_batch_delay_ms as i64,
            shutdown,
        }
    }

    /// Validate and persist a campaign with all recipients pending.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        user_id: i64,
        session_id: &str,
        name: String,
        template: Template,
        recipients: Vec<RecipientInput>,
        scheduled_at: Option<DateTime<Utc>>,
        batch_size: Option<i64>,
        batch_delay_ms: Option<i64>,
    ) -> Result<CampaignRow, GatewayError> {
        let session = self.storage.session_owned(session_id, user_id)?;
        if !session.is_active {
            return Err(GatewayError::precondition("session is not active"));
        }

        if recipients.is_empty() || recipients.len() > MAX_RECIPIENTS {
            return Err(GatewayError::invalid_argument(format!(
                "recipient count must be between 1 and {MAX_RECIPIENTS}"
            )));
        }
        if name.trim().is_empty() {
            return Err(GatewayError::invalid_argument("campaign name must not be empty"));
        }
        if template.content.trim().is_empty() {
            return Err(GatewayError::invalid_argument("template content must not be empty"));
        }
        if matches!(template.kind, MessageKind::Image | MessageKind::Document)
            && template.media_url.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(GatewayError::invalid_argument(
                "mediaUrl is required for image and document templates",
            ));
        }

        let mut normalized: Vec<(String, Option<String>)> = Vec::with_capacity(recipients.len());
        for r in recipients {
            let phone = normalize_phone(&r.phone);
            if phone.is_empty() {
                return Err(GatewayError::invalid_argument(format!(
                    "recipient phone {:?} has no digits",
                    r.phone
                )));
            }
            normalized.push((phone, r.name));
        }

        let campaign = self.storage.create_campaign(
            NewCampaign {
                user_id,
                session_id: session.id,
                name,
                template,
                scheduled_at,
                batch_size: batch_size.unwrap_or(self.default_batch_size).max(1),
                batch_delay_ms: batch_delay_ms.unwrap_or(self.default_batch_delay_ms).max(0),
            },
            &normalized,
        )?;
        tracing::info!(campaign = campaign.id, total = campaign.total, "campaign created");
        Ok(campaign)
    }

    /// Start processing a campaign in the background. Returns immediately
    /// once the transition to `processing` is persisted.
    pub async fn execute(&self, user_id: i64, campaign_id: i64) -> Result<CampaignRow, GatewayError> {
        let campaign = self.storage.campaign_owned(campaign_id, user_id)?;
        match campaign.status {
            CampaignStatus::Draft | CampaignStatus::Scheduled => {}
            other => {
                return Err(GatewayError::precondition(format!(
                    "campaign cannot start from status {}",
                    other.as_str()
                )));
            }
        }
        if let Some(at) = campaign.scheduled_at {
            if at > Utc::now() {
                return Err(GatewayError::precondition("campaign is scheduled for a future time"));
            }
        }

        let session = self
            .storage
            .session_by_db_id(campaign.session_id)?
            .ok_or_else(|| GatewayError::not_found("campaign session not found"))?;
        if !session.is_active || !self.manager.is_connected(&session.session_id).await {
            return Err(GatewayError::precondition("session is not connected"));
        }

        self.storage.set_campaign_status(campaign.id, CampaignStatus::Processing, Utc::now())?;
        self.hub.publish_broadcast(
            user_id,
            campaign.id,
            GatewayEvent::BroadcastStarted { campaign: campaign.id, total: campaign.total },
        );

        let runner = CampaignRunner {
            storage: Arc::clone(&self.storage),
            hub: Arc::clone(&self.hub),
            limiter: Arc::clone(&self.limiter),
            manager: Arc::clone(&self.manager),
            shutdown: self.shutdown.clone(),
            campaign_id: campaign.id,
            user_id,
            session_external: session.session_id.clone(),
            session_db_id: session.id,
        };
        tokio::spawn(async move {
            runner.run().await;
        });

        self.storage.campaign_owned(campaign_id, user_id)
    }

    /// Cancel from any non-terminal state. A running loop observes the
    /// persisted status and stops after the in-flight recipient.
    pub async fn cancel(&self, user_id: i64, campaign_id: i64) -> Result<CampaignRow, GatewayError> {
        let campaign = self.storage.campaign_owned(campaign_id, user_id)?;
        if !campaign.status.cancellable() {
            return Err(GatewayError::precondition(format!(
                "campaign in status {} cannot be cancelled",
                campaign.status.as_str()
            )));
        }
        self.storage.set_campaign_status(campaign_id, CampaignStatus::Cancelled, Utc::now())?;
        self.storage.campaign_owned(campaign_id, user_id)
    }
}

/// Replace `{{name}}` and `{{phone}}` in a template. Identity on
/// templates with no variables.
pub fn render_template(content: &str, name: Option<&str>, phone: &str) -> String {
    content
        .replace("{{name}}", name.filter(|n| !n.is_empty()).unwrap_or(phone))
        .replace("{{phone}}", phone)
}

/// Filename and mimetype guesses for document sends.
fn document_meta(media_url: &str) -> (String, String) {
    let filename = media_url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .split('?')
        .next()
        .unwrap_or("document")
        .to_owned();
    let mimetype = match filename.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") | Some("docx") => "application/msword",
        Some("xls") | Some("xlsx") => "application/vnd.ms-excel",
        Some("zip") => "application/zip",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    };
    (filename, mimetype.to_owned())
}

struct CampaignRunner {
    storage: Arc<Storage>,
    hub: Arc<EventHub>,
    limiter: Arc<RateLimiter>,
    manager: Arc<SessionManager>,
    shutdown: CancellationToken,
    campaign_id: i64,
    user_id: i64,
    session_external: String,
    session_db_id: i64,
}

impl CampaignRunner {
    async fn run(self) {
        match self.process().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(campaign = self.campaign_id, err = %e, "campaign failed");
                let _ = self.storage.set_campaign_status(
                    self.campaign_id,
                    CampaignStatus::Failed,
                    Utc::now(),
                );
                self.hub.publish_broadcast(
                    self.user_id,
                    self.campaign_id,
                    GatewayEvent::BroadcastFailed {
                        campaign: self.campaign_id,
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    async fn process(&self) -> Result<(), GatewayError> {
        let campaign = self
            .storage
            .campaign_by_id(self.campaign_id)?
            .ok_or_else(|| GatewayError::not_found("campaign disappeared"))?;
        let recipients = self.storage.pending_recipients(self.campaign_id)?;
        let total = recipients.len();
        let batch_size = campaign.batch_size.max(1) as usize;
        let batch_delay = std::time::Duration::from_millis(campaign.batch_delay_ms.max(0) as u64);

        let mut in_batch = 0usize;
        for (index, recipient) in recipients.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            // Cancellation check covers every recipient, which subsumes
            // the batch-boundary requirement.
            if self.storage.campaign_status(self.campaign_id)? == CampaignStatus::Cancelled {
                tracing::info!(campaign = self.campaign_id, "campaign cancelled, stopping");
                return Ok(());
            }

            self.wait_for_admission().await?;
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            self.deliver(&campaign, recipient).await?;

            let is_last = index + 1 == total;
            if (index as i64 + 1) % PROGRESS_EVERY == 0 || is_last {
                self.publish_progress()?;
            }

            in_batch += 1;
            if in_batch >= batch_size && !is_last {
                in_batch = 0;
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(batch_delay) => {}
                }
            }
        }

        // Drained: complete unless someone cancelled after the last send.
        if self.storage.campaign_status(self.campaign_id)? == CampaignStatus::Processing {
            self.storage.set_campaign_status(self.campaign_id, CampaignStatus::Completed, Utc::now())?;
            let row = self
                .storage
                .campaign_by_id(self.campaign_id)?
                .ok_or_else(|| GatewayError::not_found("campaign disappeared"))?;
            self.hub.publish_broadcast(
                self.user_id,
                self.campaign_id,
                GatewayEvent::BroadcastCompleted {
                    campaign: self.campaign_id,
                    sent: row.sent,
                    failed: row.failed,
                    total: row.total,
                },
            );
            tracing::info!(campaign = self.campaign_id, sent = row.sent, failed = row.failed, "campaign completed");
        }
        Ok(())
    }

    /// Block until the limiter admits the next send; denial sleeps the
    /// returned delay and retries the same recipient without counting it.
    async fn wait_for_admission(&self) -> Result<(), GatewayError> {
        loop {
            let admission = self.limiter.check(self.session_db_id)?;
            if admission.can_send {
                if !admission.delay.is_zero() {
                    tokio::time::sleep(admission.delay).await;
                }
                return Ok(());
            }
            tracing::debug!(
                campaign = self.campaign_id,
                delay_ms = admission.delay.as_millis() as u64,
                "send denied, waiting"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(admission.delay) => {}
            }
        }
    }

    /// One recipient: render, send, account. Send failures mark the
    /// recipient failed and keep the loop going.
    async fn deliver(
        &self,
        campaign: &CampaignRow,
        recipient: &RecipientRow,
    ) -> Result<(), GatewayError> {
        let to = format!("{}@s.whatsapp.net", recipient.phone);
        let text =
            render_template(&campaign.template.content, recipient.name.as_deref(), &recipient.phone);

        let outcome = match campaign.template.kind {
            MessageKind::Image => {
                let url = campaign.template.media_url.as_deref().unwrap_or_default();
                let caption = campaign
                    .template
                    .caption
                    .as_deref()
                    .map(|c| render_template(c, recipient.name.as_deref(), &recipient.phone))
                    .unwrap_or(text);
                self.manager.send_image(&self.session_external, &to, url, Some(caption.as_str())).await
            }
            MessageKind::Document => {
                let url = campaign.template.media_url.as_deref().unwrap_or_default();
                let (filename, mimetype) = document_meta(url);
                self.manager
                    .send_document(&self.session_external, &to, url, &filename, &mimetype)
                    .await
            }
            _ => self.manager.send_text(&self.session_external, &to, &text).await,
        };

        match outcome {
            Ok(_receipt) => {
                self.storage.mark_recipient_sent(recipient.id, self.campaign_id, Utc::now())?;
                self.limiter.record_sent(self.session_db_id)?;
            }
            Err(e) => {
                tracing::warn!(campaign = self.campaign_id, phone = %recipient.phone, err = %e, "recipient send failed");
                self.storage.mark_recipient_failed(
                    recipient.id,
                    self.campaign_id,
                    &e.to_string(),
                    Utc::now(),
                )?;
            }
        }
        Ok(())
    }

    fn publish_progress(&self) -> Result<(), GatewayError> {
        let row = self
            .storage
            .campaign_by_id(self.campaign_id)?
            .ok_or_else(|| GatewayError::not_found("campaign disappeared"))?;
        self.hub.publish_broadcast(
            self.user_id,
            self.campaign_id,
            GatewayEvent::BroadcastProgress {
                campaign: self.campaign_id,
                sent: row.sent,
                failed: row.failed,
                total: row.total,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
