// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end pipeline tests over the scriptable mock network: pairing,
//! idempotent inbound dispatch, auto-reply, rate limiting, and fatal
//! disconnect cleanup. Paused tokio time makes the human-like pacing
//! sleeps instant.

use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;

use chatgate::events::{Envelope, GatewayEvent};
use chatgate::model::{MessageKind, MessageStatus, SessionStatus};
use chatgate::testkit::{harness, harness_tuned, FakeAi, FakeShipping, TestHarness};
use chatgate::upstream::{CloseReason, InboundMessage, TransportEvent, UpsertKind};

const WAIT: Duration = Duration::from_secs(30);

async fn start_session(h: &TestHarness, session_id: &str, user_id: i64) {
    h.state
        .storage
        .create_session(chatgate::storage::sessions::NewSession {
            session_id: session_id.to_owned(),
            user_id,
            name: "Toko Maju".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("create session row");
    h.state.manager.create(session_id, user_id).await.expect("start driver");
}

async fn emit(h: &TestHarness, session_id: &str, event: TransportEvent) {
    for _ in 0..100 {
        if h.network.emit(session_id, event.clone()).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    unreachable!("driver never opened a transport link for {session_id}");
}

async fn pair(h: &TestHarness, session_id: &str, phone: &str) {
    emit(h, session_id, TransportEvent::PairingSuccess { phone: phone.to_owned() }).await;
    for _ in 0..100 {
        if h.state.manager.is_connected(session_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    unreachable!("{session_id} never connected");
}

fn incoming_text(message_id: &str, from: &str, text: &str) -> TransportEvent {
    TransportEvent::MessageUpsert {
        kind: UpsertKind::Notify,
        message: InboundMessage {
            remote_jid: format!("{from}@s.whatsapp.net"),
            from_me: false,
            participant: None,
            message_id: message_id.to_owned(),
            push_name: Some("Budi".into()),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            text: Some(text.to_owned()),
            media: None,
        },
    }
}

async fn next_matching(
    rx: &mut tokio::sync::broadcast::Receiver<Envelope>,
    mut pred: impl FnMut(&GatewayEvent) -> bool,
) -> GatewayEvent {
    loop {
        let envelope = match timeout(WAIT, rx.recv()).await {
            Ok(Ok(e)) => e,
            Ok(Err(_)) | Err(_) => unreachable!("expected event never arrived"),
        };
        if pred(&envelope.event) {
            return envelope.event;
        }
    }
}

// -- Scenario: QR then pairing ------------------------------------------------

#[tokio::test(start_paused = true)]
async fn qr_then_connected_happy_path() {
    let h = harness();
    let mut rx = h.state.hub.subscribe();
    start_session(&h, "s-1", 1).await;

    emit(&h, "s-1", TransportEvent::Qr { payload: "2@payload-1".into() }).await;
    let event = next_matching(&mut rx, |e| matches!(e, GatewayEvent::SessionQr { .. })).await;
    let GatewayEvent::SessionQr { session, qr_code, .. } = event else { unreachable!() };
    assert_eq!(session, "s-1");
    assert!(qr_code.starts_with("data:image/svg+xml;base64,"));

    pair(&h, "s-1", "628111111111").await;
    let event =
        next_matching(&mut rx, |e| matches!(e, GatewayEvent::SessionConnected { .. })).await;
    let GatewayEvent::SessionConnected { phone, .. } = event else { unreachable!() };
    assert_eq!(phone, "628111111111");

    // Event-after-persist: by the time the event was observable the row
    // already read connected.
    let row = h.state.storage.session_by_external("s-1").expect("get").expect("row");
    assert_eq!(row.status, SessionStatus::Connected);
    assert_eq!(row.phone_number.as_deref(), Some("628111111111"));
    assert!(row.qr_code.is_none(), "pairing consumes the QR");
}

// -- Scenario: idempotent inbound + one auto-reply ----------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_inbound_persists_once_and_replies_once() {
    let h = harness();
    let mut rx = h.state.hub.subscribe();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    emit(&h, "s-1", incoming_text("m-42", "628122222222", "hi")).await;
    emit(&h, "s-1", incoming_text("m-42", "628122222222", "hi")).await;

    // Exactly one auto-reply goes out.
    next_matching(&mut rx, |e| matches!(e, GatewayEvent::MessageSent { .. })).await;

    let transport = h.network.transport("s-1").expect("transport");
    // Give the second (duplicate) dispatch a chance to misbehave.
    tokio::time::sleep(Duration::from_secs(15)).await;
    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1, "duplicate event must not produce a second reply");
    assert_eq!(sent[0].to, "628122222222@s.whatsapp.net");
    assert_eq!(sent[0].body, "(fake ai reply)");

    // One persisted inbound row.
    let row = h.state.storage.message_by_external("m-42").expect("get").expect("row");
    assert_eq!(row.status, MessageStatus::Delivered);
    assert_eq!(row.from_number, "628122222222");
    assert_eq!(row.to_number, "628111111111");

    // Typing simulation ran: composing then paused.
    let presences = transport.presence_log();
    assert!(presences.len() >= 2);
}

#[tokio::test(start_paused = true)]
async fn own_messages_and_stale_history_are_dropped() {
    let h = harness();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    // fromMe.
    let mut own = incoming_text("m-own", "628122222222", "me");
    if let TransportEvent::MessageUpsert { message, .. } = &mut own {
        message.from_me = true;
    }
    emit(&h, "s-1", own).await;

    // Too old even for the append window.
    let mut stale = incoming_text("m-stale", "628122222222", "old");
    if let TransportEvent::MessageUpsert { kind, message } = &mut stale {
        *kind = UpsertKind::Append;
        message.timestamp = Utc::now() - chrono::Duration::hours(2);
    }
    emit(&h, "s-1", stale).await;

    // A fresh append inside the 30-minute window is accepted.
    let mut resync = incoming_text("m-resync", "628122222222", "recent");
    if let TransportEvent::MessageUpsert { kind, message } = &mut resync {
        *kind = UpsertKind::Append;
        message.timestamp = Utc::now() - chrono::Duration::minutes(20);
    }
    emit(&h, "s-1", resync).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.state.storage.message_by_external("m-own").expect("q").is_none());
    assert!(h.state.storage.message_by_external("m-stale").expect("q").is_none());
    assert!(h.state.storage.message_by_external("m-resync").expect("q").is_some());
}

#[tokio::test(start_paused = true)]
async fn human_agent_assignment_suppresses_auto_reply() {
    let h = harness();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;
    let session = h.state.storage.session_by_external("s-1").expect("get").expect("row");

    // Seed the conversation and claim it for a human.
    h.state.storage.upsert_conversation(session.id, "628122222222", Utc::now()).expect("conv");
    h.state
        .storage
        .assign_human_agent(session.id, "628122222222", Some(99))
        .expect("assign");

    emit(&h, "s-1", incoming_text("m-1", "628122222222", "halo")).await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    let transport = h.network.transport("s-1").expect("transport");
    assert!(transport.sent_messages().is_empty(), "claimed conversation must stay silent");
    // The message itself is still persisted.
    assert!(h.state.storage.message_by_external("m-1").expect("q").is_some());
}

// -- Scenario: responder priority ---------------------------------------------

#[tokio::test(start_paused = true)]
async fn manual_rule_outranks_shipping_and_ai() {
    let h = harness();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;
    let session = h.state.storage.session_by_external("s-1").expect("get").expect("row");
    h.state
        .storage
        .insert_rule(session.id, "cek ongkir", chatgate::model::MatchMode::Contains, "Rule wins", 10)
        .expect("rule");

    emit(&h, "s-1", incoming_text("m-1", "628122222222", "cek ongkir jakarta ke bandung")).await;
    for _ in 0..100 {
        let transport = h.network.transport("s-1").expect("transport");
        if !transport.sent_messages().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let transport = h.network.transport("s-1").expect("transport");
    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "Rule wins");

    let outgoing = h
        .state
        .storage
        .conversation_history(session.id, "628122222222", 10)
        .expect("history")
        .into_iter()
        .find(|m| m.direction == chatgate::model::Direction::Outgoing)
        .expect("outgoing row");
    assert_eq!(outgoing.reply_source, Some(chatgate::model::ReplySource::Manual));
}

#[tokio::test(start_paused = true)]
async fn shipping_command_formats_quote() {
    let h = harness();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    emit(&h, "s-1", incoming_text("m-1", "628122222222", "cek ongkir jakarta ke bandung 2kg jne"))
        .await;
    for _ in 0..100 {
        let transport = h.network.transport("s-1").expect("transport");
        if !transport.sent_messages().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let transport = h.network.transport("s-1").expect("transport");
    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("REG"));
    assert!(sent[0].body.contains("Rp18.000"));
}

#[tokio::test(start_paused = true)]
async fn failed_collaborators_degrade_to_canned_replies() {
    let h = harness_tuned(FakeAi::failing(), FakeShipping::failing(), |_| {});
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    // Shipping command with a dead provider: canonical help reply.
    emit(&h, "s-1", incoming_text("m-1", "628122222222", "cek ongkir jakarta ke bandung")).await;
    // Plain text with a dead AI: canned fallback.
    emit(&h, "s-1", incoming_text("m-2", "628133333333", "halo kak")).await;

    for _ in 0..200 {
        let transport = h.network.transport("s-1").expect("transport");
        if transport.sent_messages().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let transport = h.network.transport("s-1").expect("transport");
    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 2);
    let bodies: Vec<&str> = sent.iter().map(|m| m.body.as_str()).collect();
    assert!(bodies.iter().any(|b| b.contains("Format cek ongkir")));
    assert!(bodies.iter().any(|b| b.contains("Maaf")));
}

// -- Scenario: rate-limit denial ----------------------------------------------

#[tokio::test(start_paused = true)]
async fn fourth_reply_in_hour_fails_with_rate_limit() {
    let h = harness_tuned(FakeAi::replying("ok"), FakeShipping::with_quote(), |c| {
        c.messages_per_hour = 3;
    });
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    for i in 0..4 {
        emit(&h, "s-1", incoming_text(&format!("m-{i}"), "628122222222", "halo")).await;
        // Let each detached reply drain before the next arrives.
        for _ in 0..200 {
            let done = h
                .state
                .storage
                .conversation_history(
                    h.state.storage.session_by_external("s-1").expect("q").expect("row").id,
                    "628122222222",
                    20,
                )
                .expect("history")
                .iter()
                .filter(|m| m.direction == chatgate::model::Direction::Outgoing)
                .filter(|m| m.status != MessageStatus::Pending)
                .count();
            if done > i {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    let session = h.state.storage.session_by_external("s-1").expect("q").expect("row");
    let outgoing: Vec<_> = h
        .state
        .storage
        .conversation_history(session.id, "628122222222", 20)
        .expect("history")
        .into_iter()
        .filter(|m| m.direction == chatgate::model::Direction::Outgoing)
        .collect();
    assert_eq!(outgoing.len(), 4);
    let sent = outgoing.iter().filter(|m| m.status == MessageStatus::Sent).count();
    let failed: Vec<_> =
        outgoing.iter().filter(|m| m.status == MessageStatus::Failed).collect();
    assert_eq!(sent, 3, "first three replies go out");
    assert_eq!(failed.len(), 1, "fourth is denied");
    let reason = failed[0].failure_reason.as_deref().expect("reason");
    assert!(reason.contains("rate limit"), "got: {reason}");

    let transport = h.network.transport("s-1").expect("transport");
    assert_eq!(transport.sent_messages().len(), 3);
}

// -- Scenario: fatal disconnect cleanup ---------------------------------------

#[tokio::test(start_paused = true)]
async fn fatal_logout_purges_credentials_and_fails_session() {
    let h = harness();
    let mut rx = h.state.hub.subscribe();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    // Fake an on-disk credential directory.
    let cred_dir = h.storage_root.join("s-1");
    std::fs::create_dir_all(&cred_dir).expect("mkdir");
    std::fs::write(cred_dir.join("creds.json"), "{}").expect("write creds");

    emit(&h, "s-1", TransportEvent::Closed { reason: CloseReason::LoggedOut }).await;

    let event =
        next_matching(&mut rx, |e| matches!(e, GatewayEvent::SessionConnectionFailed { .. })).await;
    let GatewayEvent::SessionConnectionFailed { reason, .. } = event else { unreachable!() };
    assert!(reason.contains("logged out"), "got: {reason}");

    let row = h.state.storage.session_by_external("s-1").expect("q").expect("row");
    assert_eq!(row.status, SessionStatus::Failed);
    assert!(!cred_dir.exists(), "credentials must be purged");
    assert!(!h.state.manager.is_active("s-1").await, "driver must stop");
    assert_eq!(h.network.connect_count(), 1, "no reconnect after a fatal close");
}

// -- Scenario: transient close reconnects -------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_close_reconnects_with_backoff() {
    let h = harness();
    let mut rx = h.state.hub.subscribe();
    start_session(&h, "s-1", 1).await;
    pair(&h, "s-1", "628111111111").await;

    emit(&h, "s-1", TransportEvent::Closed { reason: CloseReason::ConnectionLost }).await;

    next_matching(&mut rx, |e| matches!(e, GatewayEvent::SessionDisconnected { .. })).await;

    // The driver dials again and the session can re-pair.
    for _ in 0..200 {
        if h.network.connect_count() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(h.network.connect_count() >= 2, "expected a reconnect attempt");

    pair(&h, "s-1", "628111111111").await;
    assert!(h.state.manager.is_connected("s-1").await);
}
