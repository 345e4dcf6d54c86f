// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory scraper: enumerates the session's contacts and groups under
//! a daily quota and cooldown, with randomized pacing between groups and
//! batched persistence, so bulk collection stays under the network's
//! anti-abuse radar.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ScraperLimits;
use crate::error::GatewayError;
use crate::inbound::jid::{normalize_phone, parse_identity, Identity};
use crate::pacing;
use crate::session::SessionManager;
use crate::storage::contacts::ContactUpsert;
use crate::storage::groups::{GroupUpsert, MemberUpsert};
use crate::storage::Storage;
use crate::upstream::{ChatTransport, DirectoryEntry};

/// Result of a completed scrape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScrapeOutcome {
    pub log_id: i64,
    pub total: i64,
}

/// Quota and cooldown read-back for the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QuotaSnapshot {
    pub scrapes_today: u32,
    pub max_scrapes_per_day: u32,
    pub cooldown_remaining_secs: Option<u64>,
    pub can_scrape: bool,
}

/// One collected entry before persistence.
#[derive(Debug, Clone)]
struct PendingContact {
    key: String,
    display_name: Option<String>,
    push_name: Option<String>,
    is_business: bool,
    source: &'static str,
    jid: String,
    is_lid: bool,
    from_group: bool,
}

pub struct Scraper {
    storage: Arc<Storage>,
    manager: Arc<SessionManager>,
    limits: ScraperLimits,
}

impl Scraper {
    pub fn new(storage: Arc<Storage>, manager: Arc<SessionManager>, limits: ScraperLimits) -> Self {
        Self { storage, manager, limits }
    }

    /// Quota / cooldown snapshot for (user, session).
    pub fn quota_snapshot(
        &self,
        user_id: i64,
        session_db_id: i64,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, GatewayError> {
        let scrapes_today = self.storage.scrapes_completed_today(user_id, session_db_id, now)?;
        let cooldown_remaining = self
            .storage
            .last_scrape_completed_at(user_id, session_db_id)?
            .and_then(|last| {
                let elapsed = now.signed_duration_since(last).to_std().ok()?;
                self.limits.cooldown_between_scrapes.checked_sub(elapsed)
            });
        let can_scrape =
            scrapes_today < self.limits.max_scrapes_per_day && cooldown_remaining.is_none();
        Ok(QuotaSnapshot {
            scrapes_today,
            max_scrapes_per_day: self.limits.max_scrapes_per_day,
            cooldown_remaining_secs: cooldown_remaining.map(|d| d.as_secs()),
            can_scrape,
        })
    }

    fn enforce_quota(
        &self,
        user_id: i64,
        session_db_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let snapshot = self.quota_snapshot(user_id, session_db_id, now)?;
        if let Some(secs) = snapshot.cooldown_remaining_secs {
            let minutes = secs.div_ceil(60).max(1);
            return Err(GatewayError::rate_limited(
                format!("scrape cooldown active, retry in {minutes} minutes"),
                secs * 1000,
            ));
        }
        if snapshot.scrapes_today >= snapshot.max_scrapes_per_day {
            return Err(GatewayError::rate_limited(
                format!(
                    "daily scrape quota of {} reached",
                    snapshot.max_scrapes_per_day
                ),
                Duration::from_secs(3600).as_millis() as u64,
            ));
        }
        Ok(())
    }

    async fn connected_transport(
        &self,
        session_id: &str,
    ) -> Result<Arc<dyn ChatTransport>, GatewayError> {
        let handle = self
            .manager
            .get(session_id)
            .await
            .ok_or_else(|| GatewayError::precondition("session is not active"))?;
        if !handle.is_connected() {
            return Err(GatewayError::precondition("session is not connected"));
        }
        handle
            .transport()
            .await
            .ok_or_else(|| GatewayError::precondition("session has no transport"))
    }

    /// Full contact scrape: store, chat list, then group participants, in
    /// that priority, deduplicated by phone.
    pub async fn scrape_contacts(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<ScrapeOutcome, GatewayError> {
        let session = self.storage.session_owned(session_id, user_id)?;
        let transport = self.connected_transport(session_id).await?;
        let now = Utc::now();
        self.enforce_quota(user_id, session.id, now)?;

        let log_id = self.storage.start_scrape_log(user_id, session.id, "contacts", now)?;
        match self.collect_contacts(&transport, user_id, session.id).await {
            Ok(total) => {
                self.storage.complete_scrape_log(log_id, total, Utc::now())?;
                tracing::info!(session_id, total, "contact scrape completed");
                Ok(ScrapeOutcome { log_id, total })
            }
            Err(e) => {
                self.storage.fail_scrape_log(log_id, &e.to_string(), Utc::now())?;
                Err(e)
            }
        }
    }

    async fn collect_contacts(
        &self,
        transport: &Arc<dyn ChatTransport>,
        user_id: i64,
        session_db_id: i64,
    ) -> Result<i64, GatewayError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut collected: Vec<PendingContact> = Vec::new();

        // (a) provider contact store, (b) chat list.
        for (source, entries) in [
            ("contact_store", self.fetch(transport.contacts()).await?),
            ("chat_list", self.fetch(transport.chats()).await?),
        ] {
            for entry in entries {
                if collected.len() >= self.limits.max_contacts_per_scrape {
                    break;
                }
                if entry.is_group {
                    continue;
                }
                self.push_entry(&mut seen, &mut collected, source, &entry, false);
            }
        }

        // (c) each joined group's participant list, paced.
        if collected.len() < self.limits.max_contacts_per_scrape {
            let groups = self.fetch(transport.groups()).await?;
            for (i, group) in groups.iter().enumerate() {
                if collected.len() >= self.limits.max_contacts_per_scrape {
                    break;
                }
                if i > 0 {
                    let delay = pacing::inter_group_delay(
                        self.limits.min_delay_between_groups,
                        self.limits.max_delay_between_groups,
                        &mut rand::rng(),
                    );
                    tokio::time::sleep(delay).await;
                }
                let participants = match transport.group_participants(&group.jid).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(group = %group.jid, err = %e, "participant fetch failed");
                        continue;
                    }
                };
                for participant in participants {
                    if collected.len() >= self.limits.max_contacts_per_scrape {
                        break;
                    }
                    let entry = DirectoryEntry {
                        jid: participant.jid.clone(),
                        phone: None,
                        display_name: None,
                        push_name: participant.push_name.clone(),
                        is_business: false,
                        is_group: false,
                    };
                    self.push_entry(&mut seen, &mut collected, "group_participants", &entry, true);
                }
            }
        }

        self.resolve_lids(transport, &mut collected).await;
        self.persist_contacts(user_id, session_db_id, &collected).await?;
        Ok(collected.len() as i64)
    }

    fn push_entry(
        &self,
        seen: &mut HashSet<String>,
        collected: &mut Vec<PendingContact>,
        source: &'static str,
        entry: &DirectoryEntry,
        from_group: bool,
    ) {
        let identity = match entry.phone.as_deref() {
            Some(phone) if !phone.is_empty() => Identity::Phone(normalize_phone(phone)),
            _ => parse_identity(&entry.jid),
        };
        let key = identity.record_key();
        if key.is_empty() || key == "LID_" || !seen.insert(key.clone()) {
            return;
        }
        collected.push(PendingContact {
            key,
            display_name: entry.display_name.clone(),
            push_name: entry.push_name.clone(),
            is_business: entry.is_business,
            source,
            jid: entry.jid.clone(),
            is_lid: identity.is_lid(),
            from_group,
        });
    }

    /// Batched LID resolution (≤ batch limit per request). Resolved LIDs
    /// are rewritten to their phone key; the rest keep the `LID_` form.
    async fn resolve_lids(
        &self,
        transport: &Arc<dyn ChatTransport>,
        collected: &mut [PendingContact],
    ) {
        let lids: Vec<String> = collected
            .iter()
            .filter(|c| c.is_lid)
            .map(|c| c.key.trim_start_matches("LID_").to_owned())
            .collect();
        if lids.is_empty() {
            return;
        }

        let mut resolved: HashMap<String, String> = HashMap::new();
        for chunk in lids.chunks(self.limits.lid_resolve_batch) {
            match transport.resolve_lids(chunk).await {
                Ok(map) => resolved.extend(map),
                Err(e) => {
                    tracing::warn!(err = %e, batch = chunk.len(), "lid resolution batch failed");
                }
            }
        }

        for contact in collected.iter_mut().filter(|c| c.is_lid) {
            let digits = contact.key.trim_start_matches("LID_").to_owned();
            if let Some(phone) = resolved.get(&digits) {
                contact.key = normalize_phone(phone);
                contact.is_lid = false;
            }
        }
    }

    /// Upsert collected rows in batches with a save delay between them.
    async fn persist_contacts(
        &self,
        user_id: i64,
        session_db_id: i64,
        collected: &[PendingContact],
    ) -> Result<(), GatewayError> {
        for (i, batch) in collected.chunks(self.limits.contacts_per_batch).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.limits.batch_save_delay).await;
            }
            for contact in batch {
                self.storage.upsert_contact(
                    user_id,
                    session_db_id,
                    ContactUpsert {
                        phone: contact.key.clone(),
                        display_name: contact.display_name.clone(),
                        push_name: contact.push_name.clone(),
                        is_business: contact.is_business,
                        is_group: false,
                        metadata: Some(serde_json::json!({
                            "source": contact.source,
                            "fromGroup": contact.from_group,
                            "jid": contact.jid,
                            "isLidFormat": contact.is_lid,
                        })),
                        last_message_at: None,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Group scrape: one row per joined group with participant and admin
    /// counts, paced like the contact scrape.
    pub async fn scrape_groups(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<ScrapeOutcome, GatewayError> {
        let session = self.storage.session_owned(session_id, user_id)?;
        let transport = self.connected_transport(session_id).await?;
        let now = Utc::now();
        self.enforce_quota(user_id, session.id, now)?;

        let log_id = self.storage.start_scrape_log(user_id, session.id, "groups", now)?;
        match self.collect_groups(&transport, user_id, session.id).await {
            Ok(total) => {
                self.storage.complete_scrape_log(log_id, total, Utc::now())?;
                tracing::info!(session_id, total, "group scrape completed");
                Ok(ScrapeOutcome { log_id, total })
            }
            Err(e) => {
                self.storage.fail_scrape_log(log_id, &e.to_string(), Utc::now())?;
                Err(e)
            }
        }
    }

    async fn collect_groups(
        &self,
        transport: &Arc<dyn ChatTransport>,
        user_id: i64,
        session_db_id: i64,
    ) -> Result<i64, GatewayError> {
        let groups = self.fetch(transport.groups()).await?;
        let mut total = 0i64;
        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                let delay = pacing::inter_group_delay(
                    self.limits.min_delay_between_groups,
                    self.limits.max_delay_between_groups,
                    &mut rand::rng(),
                );
                tokio::time::sleep(delay).await;
            }
            let group_id = self.storage.upsert_group(
                user_id,
                session_db_id,
                GroupUpsert {
                    group_jid: group.jid.clone(),
                    name: group.name.clone(),
                    description: group.description.clone(),
                    owner_jid: group.owner_jid.clone(),
                    participant_count: 0,
                    admin_count: 0,
                    is_announce: group.is_announce,
                    is_locked: group.is_locked,
                    metadata: Some(serde_json::json!({ "source": "group_scrape" })),
                },
            )?;
            match transport.group_participants(&group.jid).await {
                Ok(participants) => {
                    for p in participants {
                        let identity = parse_identity(&p.jid);
                        self.storage.upsert_group_member(
                            group_id,
                            MemberUpsert {
                                participant_jid: p.jid.clone(),
                                phone: identity.phone().map(str::to_owned),
                                display_name: None,
                                push_name: p.push_name.clone(),
                                is_admin: p.is_admin,
                                is_super_admin: p.is_super_admin,
                                is_lid: identity.is_lid(),
                            },
                        )?;
                    }
                }
                Err(e) => {
                    tracing::warn!(group = %group.jid, err = %e, "participant fetch failed");
                }
            }
            total += 1;
        }
        Ok(total)
    }

    /// Enumerate and persist members of one stored group.
    pub async fn scrape_group_members(
        &self,
        user_id: i64,
        group_db_id: i64,
    ) -> Result<usize, GatewayError> {
        let group = self
            .storage
            .group_by_id(group_db_id)?
            .ok_or_else(|| GatewayError::not_found(format!("group {group_db_id} not found")))?;
        if group.user_id != user_id {
            return Err(GatewayError::forbidden("group belongs to another user"));
        }
        let session = self
            .storage
            .session_by_db_id(group.session_id)?
            .ok_or_else(|| GatewayError::not_found("group session not found"))?;
        let transport = self.connected_transport(&session.session_id).await?;

        let participants = transport
            .group_participants(&group.group_jid)
            .await
            .map_err(|e| GatewayError::transient_transport(e.to_string()))?;
        let count = participants.len();
        for p in participants {
            let identity = parse_identity(&p.jid);
            self.storage.upsert_group_member(
                group.id,
                MemberUpsert {
                    participant_jid: p.jid,
                    phone: identity.phone().map(str::to_owned),
                    display_name: None,
                    push_name: p.push_name,
                    is_admin: p.is_admin,
                    is_super_admin: p.is_super_admin,
                    is_lid: identity.is_lid(),
                },
            )?;
        }
        Ok(count)
    }

    async fn fetch<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, crate::upstream::TransportError>>,
    ) -> Result<T, GatewayError> {
        fut.await.map_err(|e| GatewayError::transient_transport(e.to_string()))
    }
}
