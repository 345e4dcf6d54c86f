// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound dispatcher: turns raw transport events into persisted message
//! rows exactly once, captures contacts and group members as a side
//! effect, and hands eligible messages to the auto-reply engine without
//! blocking the per-session event pump.

pub mod jid;

use std::sync::Arc;

use chrono::Utc;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{EventHub, GatewayEvent};
use crate::inbound::jid::{is_group_jid, sender_identity};
use crate::model::{Direction, MessageKind, MessageStatus, SessionStatus};
use crate::pacing;
use crate::reply::ReplyEngine;
use crate::session::SessionHandle;
use crate::storage::contacts::ContactUpsert;
use crate::storage::groups::{GroupUpsert, MemberUpsert};
use crate::storage::messages::NewMessage;
use crate::storage::Storage;
use crate::upstream::{InboundMessage, MessageKey, UpsertKind};
use crate::webhook::WebhookForwarder;

pub struct Dispatcher {
    storage: Arc<Storage>,
    hub: Arc<EventHub>,
    reply: Arc<ReplyEngine>,
    webhooks: Arc<WebhookForwarder>,
    freshness_notify: chrono::Duration,
    freshness_append: chrono::Duration,
}

impl Dispatcher {
    pub fn new(
        config: &GatewayConfig,
        storage: Arc<Storage>,
        hub: Arc<EventHub>,
        reply: Arc<ReplyEngine>,
        webhooks: Arc<WebhookForwarder>,
    ) -> Self {
        Self {
            storage,
            hub,
            reply,
            webhooks,
            freshness_notify: chrono::Duration::seconds(config.freshness_notify_secs as i64),
            freshness_append: chrono::Duration::seconds(config.freshness_append_secs as i64),
        }
    }

    /// Run the full inbound pipeline for one transport event. Called from
    /// the session driver, so messages of one session stay in arrival
    /// order; only the auto-reply runs detached.
    pub async fn dispatch(
        &self,
        handle: &Arc<SessionHandle>,
        kind: UpsertKind,
        msg: InboundMessage,
    ) -> Result<(), GatewayError> {
        let session_id = handle.session_id.as_str();

        // Own echoes never enter the pipeline.
        if msg.from_me {
            return Ok(());
        }

        // Freshness: history appends get a wider window than live
        // notifications, so a resync is accepted without replaying
        // ancient history.
        let window = match kind {
            UpsertKind::Notify => self.freshness_notify,
            UpsertKind::Append => self.freshness_append,
        };
        let age = Utc::now().signed_duration_since(msg.timestamp);
        if age > window {
            tracing::debug!(session_id, message_id = %msg.message_id, age_secs = age.num_seconds(), "stale event dropped");
            return Ok(());
        }

        let session = self
            .storage
            .session_by_external(session_id)?
            .ok_or_else(|| GatewayError::internal(format!("dispatch for unknown session {session_id}")))?;

        // Liveness gate: an authenticated transport or a connected row.
        if !handle.is_connected() && session.status != SessionStatus::Connected {
            tracing::debug!(session_id, "session not live, inbound event skipped");
            return Ok(());
        }

        let identity = sender_identity(&msg.remote_jid, msg.participant.as_deref());
        let from_number = identity.record_key();
        let reply_jid = msg.remote_jid.clone();
        let own_phone = match handle.phone().await {
            Some(p) => p,
            None => session.phone_number.clone().unwrap_or_default(),
        };

        let new_row = NewMessage {
            session_id: session.id,
            message_id: msg.message_id.clone(),
            direction: Direction::Incoming,
            message_type: msg.kind,
            from_number: from_number.clone(),
            to_number: own_phone,
            push_name: msg.push_name.clone(),
            content: msg.text.clone(),
            media_meta: msg.media.clone(),
            status: MessageStatus::Delivered,
            is_auto_reply: false,
            reply_source: None,
            reply_context: Some(serde_json::json!({
                "replyJid": reply_jid,
                "participant": msg.participant,
                "isLidFormat": identity.is_lid(),
            })),
        };

        // Idempotent persist, one retry on a non-duplicate failure. The
        // unique key makes the duplicate path a clean stop.
        let inserted = match self.storage.insert_message(new_row.clone()) {
            Ok(row) => row,
            Err(first) => {
                tracing::warn!(session_id, err = %first, "message persist failed, retrying once");
                self.storage.insert_message(new_row)?
            }
        };
        let Some(stored) = inserted else {
            tracing::debug!(session_id, message_id = %msg.message_id, "duplicate message ignored");
            return Ok(());
        };

        let settings = session.parsed_settings();

        // Contact auto-save and group capture are best-effort; a failure
        // here never blocks the message.
        if settings.auto_save_contacts {
            if let Err(e) = self.save_contact(session.user_id, session.id, &msg, &identity) {
                tracing::warn!(session_id, err = %e, "contact auto-save failed");
            }
        }
        if is_group_jid(&msg.remote_jid) && msg.participant.is_some() {
            if let Err(e) = self.capture_group_member(session.user_id, session.id, &msg) {
                tracing::warn!(session_id, err = %e, "group member capture failed");
            }
        }

        self.schedule_read_mark(handle, &msg);

        // Conversation ledger for human-agent routing. Retried once like
        // the message persist.
        let conversation = match self.storage.upsert_conversation(session.id, &from_number, Utc::now())
        {
            Ok(row) => Ok(row),
            Err(first) => {
                tracing::warn!(session_id, err = %first, "conversation upsert failed, retrying once");
                self.storage.upsert_conversation(session.id, &from_number, Utc::now())
            }
        }?;
        if let Some(content) = stored.content.as_deref() {
            if let Err(e) =
                self.storage.append_conversation_message(conversation.id, Direction::Incoming, content)
            {
                tracing::warn!(session_id, err = %e, "conversation message append failed");
            }
        }

        self.hub.publish_session(
            session.user_id,
            session_id,
            GatewayEvent::MessageIncoming { session: session_id.to_owned(), message: stored.clone() },
        );

        if let Some(url) = session.webhook_url.as_deref() {
            self.webhooks.forward(url, &stored);
        }

        // Auto-reply decision: a conversation claimed by a human agent is
        // theirs alone.
        if conversation.human_agent_id.is_some() {
            tracing::debug!(session_id, conversation = conversation.id, "human agent assigned, auto-reply skipped");
            return Ok(());
        }
        if settings.auto_reply_enabled && stored.message_type == MessageKind::Text {
            self.reply.spawn_auto_reply(Arc::clone(handle), session, stored, reply_jid);
        }

        Ok(())
    }

    fn save_contact(
        &self,
        user_id: i64,
        session_db_id: i64,
        msg: &InboundMessage,
        identity: &jid::Identity,
    ) -> Result<(), GatewayError> {
        self.storage.upsert_contact(
            user_id,
            session_db_id,
            ContactUpsert {
                phone: identity.record_key(),
                display_name: None,
                push_name: msg.push_name.clone(),
                is_business: false,
                is_group: false,
                metadata: Some(serde_json::json!({
                    "source": "inbound_message",
                    "fromGroup": is_group_jid(&msg.remote_jid),
                    "jid": msg.participant.clone().unwrap_or_else(|| msg.remote_jid.clone()),
                    "isLidFormat": identity.is_lid(),
                })),
                last_message_at: Some(msg.timestamp),
            },
        )
    }

    fn capture_group_member(
        &self,
        user_id: i64,
        session_db_id: i64,
        msg: &InboundMessage,
    ) -> Result<(), GatewayError> {
        let Some(participant) = msg.participant.as_deref() else { return Ok(()) };
        let identity = jid::parse_identity(participant);

        let group_id = self.storage.upsert_group(
            user_id,
            session_db_id,
            GroupUpsert {
                group_jid: msg.remote_jid.clone(),
                name: String::new(),
                ..Default::default()
            },
        )?;
        self.storage.upsert_group_member(
            group_id,
            MemberUpsert {
                participant_jid: participant.to_owned(),
                phone: identity.phone().map(str::to_owned),
                display_name: None,
                push_name: msg.push_name.clone(),
                is_admin: false,
                is_super_admin: false,
                is_lid: identity.is_lid(),
            },
        )
    }

    /// Jittered read-mark simulation: a short human-ish pause scaled by
    /// message length, then the read receipt.
    fn schedule_read_mark(&self, handle: &Arc<SessionHandle>, msg: &InboundMessage) {
        let delay = pacing::read_mark_delay(
            msg.text.as_deref().map(str::len).unwrap_or(0),
            &mut rand::rng(),
        );
        let key = MessageKey {
            remote_jid: msg.remote_jid.clone(),
            message_id: msg.message_id.clone(),
            participant: msg.participant.clone(),
        };
        let handle = Arc::clone(handle);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(transport) = handle.transport().await else { return };
            if let Err(e) = transport.mark_read(&key).await {
                tracing::debug!(session_id = %handle.session_id, err = %e, "read mark failed");
            }
        });
    }
}
