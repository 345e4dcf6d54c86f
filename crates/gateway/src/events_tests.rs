// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn session_events_reach_user_and_session_keys() {
    let hub = EventHub::new();
    let mut rx = hub.subscribe();

    hub.publish_session(
        7,
        "s-1",
        GatewayEvent::SessionConnected { session: "s-1".into(), phone: "628111111111".into() },
    );

    let envelope = rx.recv().await.expect("recv");
    assert!(envelope.keys.contains(&"user:7".to_string()));
    assert!(envelope.keys.contains(&"session:s-1".to_string()));
}

#[tokio::test]
async fn subscription_set_filters_by_key() {
    let hub = EventHub::new();
    let mut rx = hub.subscribe();

    let mut subs = SubscriptionSet::for_user(7);
    hub.publish_session(
        9,
        "s-other",
        GatewayEvent::SessionDisconnected { session: "s-other".into(), reason: "closed".into() },
    );
    let envelope = rx.recv().await.expect("recv");
    assert!(!subs.wants(&envelope), "foreign user's event must be filtered");

    subs.add(session_key("s-other"));
    assert!(subs.wants(&envelope), "explicit session subscription admits it");

    subs.remove(&session_key("s-other"));
    assert!(!subs.wants(&envelope));
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let hub = EventHub::new();
    let mut rx = hub.subscribe();

    for i in 0..10i64 {
        hub.publish_broadcast(
            1,
            42,
            GatewayEvent::BroadcastProgress { campaign: 42, sent: i, failed: 0, total: 10 },
        );
    }
    for i in 0..10i64 {
        let envelope = rx.recv().await.expect("recv");
        assert!(
            matches!(envelope.event, GatewayEvent::BroadcastProgress { sent, .. } if sent == i),
            "out of order at {i}: {:?}",
            envelope.event
        );
    }
}

#[test]
fn wire_format_uses_colon_namespaced_type() {
    let event = GatewayEvent::SessionQr {
        session: "s-1".into(),
        qr_code: "data:image/svg+xml;base64,...".into(),
        expires_at: Utc::now(),
    };
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["type"], "session:qr");
    assert_eq!(json["session"], "s-1");
}
