// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-reply engine. Picks a responder in fixed priority order (manual
//! rules, the shipping-cost command, AI fallback), then walks the outbound
//! path: pending row, rate-limit gate, adaptive delay, human-like typing
//! simulation, send, bookkeeping.

pub mod ai;
pub mod rules;
pub mod shipping;

use std::sync::Arc;

use chrono::Utc;

use crate::error::GatewayError;
use crate::events::{EventHub, GatewayEvent};
use crate::model::{
    Direction, MessageKind, MessageRow, MessageStatus, ReplySource, SessionRow,
};
use crate::pacing;
use crate::ratelimit::RateLimiter;
use crate::session::SessionHandle;
use crate::storage::messages::NewMessage;
use crate::storage::Storage;
use crate::upstream::Presence;

pub struct ReplyEngine {
    storage: Arc<Storage>,
    hub: Arc<EventHub>,
    limiter: Arc<RateLimiter>,
    shipping: Arc<dyn shipping::ShippingProvider>,
    ai: Arc<dyn ai::AiResponder>,
}

impl ReplyEngine {
    pub fn new(
        storage: Arc<Storage>,
        hub: Arc<EventHub>,
        limiter: Arc<RateLimiter>,
        shipping: Arc<dyn shipping::ShippingProvider>,
        ai: Arc<dyn ai::AiResponder>,
    ) -> Self {
        Self { storage, hub, limiter, shipping, ai }
    }

    /// Run the reply as a detached task so the dispatcher never blocks on
    /// pacing sleeps or collaborator calls.
    pub fn spawn_auto_reply(
        self: &Arc<Self>,
        handle: Arc<SessionHandle>,
        session: SessionRow,
        incoming: MessageRow,
        reply_jid: String,
    ) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.run_auto_reply(handle, session, incoming, reply_jid).await {
                tracing::warn!(err = %e, "auto-reply failed");
            }
        });
    }

    async fn run_auto_reply(
        &self,
        handle: Arc<SessionHandle>,
        session: SessionRow,
        incoming: MessageRow,
        reply_jid: String,
    ) -> Result<(), GatewayError> {
        let session_id = session.session_id.clone();
        let Some(text) = incoming.content.clone() else { return Ok(()) };

        let (reply_text, source) =
            self.compose_reply(&session, &text, &incoming.from_number, &incoming.message_id).await;

        let own_phone = match handle.phone().await {
            Some(p) => p,
            None => session.phone_number.clone().unwrap_or_default(),
        };
        let message_id = format!("auto-{}", uuid::Uuid::new_v4());

        // The outgoing row exists before any gate so denials are
        // observable as failed rows.
        self.storage.insert_message(NewMessage {
            session_id: session.id,
            message_id: message_id.clone(),
            direction: Direction::Outgoing,
            message_type: MessageKind::Text,
            from_number: own_phone,
            to_number: incoming.from_number.clone(),
            push_name: None,
            content: Some(reply_text.clone()),
            media_meta: None,
            status: MessageStatus::Pending,
            is_auto_reply: true,
            reply_source: Some(source),
            reply_context: Some(serde_json::json!({ "inReplyTo": incoming.message_id })),
        })?;

        let admission = self.limiter.check(session.id)?;
        if !admission.can_send {
            let reason = admission
                .reason
                .map(|r| r.message().to_owned())
                .unwrap_or_else(|| "rate limit".to_owned());
            self.storage.fail_message(&message_id, &reason)?;
            tracing::info!(session_id, reason, "auto-reply denied by rate limiter");
            return Ok(());
        }
        tokio::time::sleep(admission.delay).await;

        if let Err(e) = self.simulate_typing(&handle, &reply_jid, &reply_text).await {
            self.storage.fail_message(&message_id, &e.message)?;
            return Err(GatewayError::transient_transport(e.message));
        }

        let transport = handle
            .transport()
            .await
            .ok_or_else(|| GatewayError::precondition("transport closed before send"))?;
        match transport.send_text(&reply_jid, &reply_text).await {
            Ok(_receipt) => {
                self.storage.advance_message_status(&message_id, MessageStatus::Sent, Utc::now())?;
                self.limiter.record_sent(session.id)?;
                if let Some(row) = self.storage.message_by_external(&message_id)? {
                    self.hub.publish_session(
                        session.user_id,
                        &session_id,
                        GatewayEvent::MessageSent { session: session_id.clone(), message: row },
                    );
                }
                if let Ok(conversation) =
                    self.storage.upsert_conversation(session.id, &incoming.from_number, Utc::now())
                {
                    let _ = self.storage.append_conversation_message(
                        conversation.id,
                        Direction::Outgoing,
                        &reply_text,
                    );
                }
                tracing::debug!(session_id, source = source.as_str(), "auto-reply sent");
                Ok(())
            }
            Err(e) => {
                self.storage.fail_message(&message_id, &e.to_string())?;
                Err(GatewayError::transient_transport(e.to_string()))
            }
        }
    }

    /// Pick the responder: manual rules, then the shipping command, then
    /// the AI fallback. Collaborator failures degrade to canned replies —
    /// there is always a response.
    async fn compose_reply(
        &self,
        session: &SessionRow,
        text: &str,
        from_phone: &str,
        current_message_id: &str,
    ) -> (String, ReplySource) {
        match self.storage.active_rules(session.id) {
            Ok(active) => {
                if let Some(rule) = rules::first_match(&active, text) {
                    return (rule.reply.clone(), ReplySource::Manual);
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, err = %e, "rule lookup failed");
            }
        }

        if let Some(query) = shipping::parse_command(text) {
            let reply = match self.shipping.cost(&query).await {
                Ok(quote) => shipping::format_quote(&query, &quote),
                Err(e) => {
                    tracing::warn!(session_id = %session.session_id, err = %e, "shipping lookup failed");
                    shipping::help_reply()
                }
            };
            return (reply, ReplySource::Rajaongkir);
        }

        let history = self
            .storage
            .conversation_history(session.id, from_phone, ai::HISTORY_WINDOW)
            .unwrap_or_default()
            .into_iter()
            .filter(|row| row.message_id != current_message_id)
            .filter_map(|row| {
                let content = row.content?;
                let role = match row.direction {
                    Direction::Incoming => "user",
                    Direction::Outgoing => "assistant",
                };
                Some(ai::ChatTurn { role: role.into(), content })
            })
            .collect();

        let request = ai::AiRequest {
            system_prompt: ai::system_prompt(session),
            history,
            user_message: text.to_owned(),
            model: session
                .ai_config
                .as_ref()
                .and_then(|c| c.get("model"))
                .and_then(|v| v.as_str())
                .map(str::to_owned),
        };
        match self.ai.complete(request).await {
            Ok(reply) => (reply, ReplySource::Openai),
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, err = %e, "AI completion failed");
                (ai::FALLBACK_REPLY.to_owned(), ReplySource::Openai)
            }
        }
    }

    /// Human-like typing: `composing`, a length-scaled pause, `paused`, a
    /// short breath, then the caller sends. A closed transport aborts; any
    /// other presence error is logged and ignored.
    async fn simulate_typing(
        &self,
        handle: &Arc<SessionHandle>,
        to: &str,
        text: &str,
    ) -> Result<(), crate::upstream::TransportError> {
        let transport = handle
            .transport()
            .await
            .ok_or_else(|| crate::upstream::TransportError::closed("transport closed"))?;

        if let Err(e) = transport.send_presence(to, Presence::Composing).await {
            if e.connection_closed {
                return Err(e);
            }
            tracing::debug!(err = %e, "composing presence failed");
        }

        let words = text.split_whitespace().count();
        let typing = pacing::typing_delay(words, &mut rand::rng());
        tokio::time::sleep(typing).await;

        if let Err(e) = transport.send_presence(to, Presence::Paused).await {
            if e.connection_closed {
                return Err(e);
            }
            tracing::debug!(err = %e, "paused presence failed");
        }

        let pause = pacing::pre_send_pause(&mut rand::rng());
        tokio::time::sleep(pause).await;
        Ok(())
    }
}
