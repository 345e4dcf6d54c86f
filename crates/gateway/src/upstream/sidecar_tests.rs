// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_qr_frame() {
    let event = parse_sidecar_frame(r#"{"event":"qr","payload":"2@abc,def"}"#);
    assert!(matches!(event, Some(TransportEvent::Qr { payload }) if payload == "2@abc,def"));
}

#[test]
fn parses_pair_frame() {
    let event = parse_sidecar_frame(r#"{"event":"pair","phone":"628111111111"}"#);
    assert!(
        matches!(event, Some(TransportEvent::PairingSuccess { phone }) if phone == "628111111111")
    );
}

#[test]
fn parses_message_frame_with_kind() {
    let text = r#"{
        "event": "message",
        "kind": "append",
        "remoteJid": "628122222222@s.whatsapp.net",
        "messageId": "m-42",
        "pushName": "Budi",
        "type": "text",
        "text": "hi",
        "timestamp": "2026-07-01T10:00:00Z"
    }"#;
    let Some(TransportEvent::MessageUpsert { kind, message }) = parse_sidecar_frame(text) else {
        unreachable!("expected a message upsert");
    };
    assert_eq!(kind, UpsertKind::Append);
    assert_eq!(message.message_id, "m-42");
    assert_eq!(message.kind, MessageKind::Text);
    assert_eq!(message.text.as_deref(), Some("hi"));
    assert!(!message.from_me);
}

#[test]
fn message_without_id_is_dropped() {
    let event = parse_sidecar_frame(r#"{"event":"message","remoteJid":"x@s.whatsapp.net"}"#);
    assert!(event.is_none());
}

#[test]
fn parses_closed_reasons() {
    let cases = [
        (r#"{"event":"closed","reason":"logged_out"}"#, CloseReason::LoggedOut),
        (r#"{"event":"closed","reason":"bad_session"}"#, CloseReason::BadSession),
        (r#"{"event":"closed","reason":"replaced"}"#, CloseReason::Replaced),
        (r#"{"event":"closed","reason":"unauthorized","code":403}"#, CloseReason::Unauthorized(403)),
        (r#"{"event":"closed","reason":"timed_out"}"#, CloseReason::TimedOut),
        (r#"{"event":"closed"}"#, CloseReason::ConnectionClosed),
    ];
    for (frame, expected) in cases {
        let event = parse_sidecar_frame(frame);
        assert!(
            matches!(event, Some(TransportEvent::Closed { ref reason }) if *reason == expected),
            "frame {frame} parsed to {event:?}"
        );
    }
}

#[test]
fn unknown_frames_are_ignored() {
    assert!(parse_sidecar_frame(r#"{"event":"presence-update"}"#).is_none());
    assert!(parse_sidecar_frame("not json").is_none());
}

#[test]
fn ws_url_from_http_base() {
    assert_eq!(
        build_ws_url("http://127.0.0.1:3001", "s-1"),
        "ws://127.0.0.1:3001/sessions/s-1/events"
    );
    assert_eq!(
        build_ws_url("https://provider.internal", "s-1"),
        "wss://provider.internal/sessions/s-1/events"
    );
}
