// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::storage::sessions::NewSession;

#[test]
fn encode_produces_svg_data_url() {
    let url = encode_qr_data_url("2@abc123,def456,ghi789").expect("encode");
    assert!(url.starts_with("data:image/svg+xml;base64,"));
    let b64 = url.trim_start_matches("data:image/svg+xml;base64,");
    let svg = BASE64.decode(b64).expect("decode");
    let svg = String::from_utf8(svg).expect("utf8");
    assert!(svg.contains("<svg"));
}

#[tokio::test]
async fn publish_persists_row_before_event() {
    let storage = Storage::open_in_memory().expect("open");
    storage
        .create_session(NewSession {
            session_id: "s-1".into(),
            user_id: 7,
            name: "t".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("session");
    let hub = EventHub::new();
    let mut rx = hub.subscribe();

    publish_qr(&storage, &hub, 7, "s-1", "2@payload", chrono::Duration::seconds(60))
        .expect("publish");

    // The row is already consistent by the time the event arrives.
    let envelope = rx.recv().await.expect("event");
    let row = storage.session_by_external("s-1").expect("get").expect("exists");
    assert!(row.qr_code.is_some());
    assert!(row.qr_valid(Utc::now()));
    assert!(matches!(envelope.event, GatewayEvent::SessionQr { .. }));
}

#[test]
fn expired_qr_is_invalid() {
    let storage = Storage::open_in_memory().expect("open");
    storage
        .create_session(NewSession {
            session_id: "s-1".into(),
            user_id: 7,
            name: "t".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("session");
    storage
        .set_session_qr("s-1", "data:...", Utc::now() - chrono::Duration::seconds(1))
        .expect("set");
    let row = storage.session_by_external("s-1").expect("get").expect("exists");
    assert!(!row.qr_valid(Utc::now()));
}
