// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn message_status_progression_is_monotone() {
    use MessageStatus::*;
    assert!(Pending.can_advance_to(Sent));
    assert!(Sent.can_advance_to(Delivered));
    assert!(Delivered.can_advance_to(Read));
    assert!(Pending.can_advance_to(Failed));

    assert!(!Sent.can_advance_to(Pending));
    assert!(!Read.can_advance_to(Delivered));
    assert!(!Delivered.can_advance_to(Sent));
}

#[test]
fn failed_is_terminal() {
    use MessageStatus::*;
    assert!(!Failed.can_advance_to(Sent));
    assert!(!Failed.can_advance_to(Read));
    assert!(!Failed.can_advance_to(Failed));
}

#[test]
fn campaign_cancellable_states() {
    use CampaignStatus::*;
    assert!(Draft.cancellable());
    assert!(Scheduled.cancellable());
    assert!(Processing.cancellable());
    assert!(!Completed.cancellable());
    assert!(!Failed.cancellable());
    assert!(!Cancelled.cancellable());
}

#[test]
fn settings_defaults_and_rename() {
    let parsed: SessionSettings = serde_json::from_value(serde_json::json!({}))
        .unwrap_or_default();
    assert!(parsed.auto_reply_enabled);
    assert!(parsed.auto_save_contacts);
    assert!(parsed.custom_system_prompt.is_none());

    let parsed: SessionSettings = serde_json::from_value(serde_json::json!({
        "autoReplyEnabled": false,
        "customSystemPrompt": "be terse"
    }))
    .unwrap_or_default();
    assert!(!parsed.auto_reply_enabled);
    assert_eq!(parsed.custom_system_prompt.as_deref(), Some("be terse"));
}

#[test]
fn enum_round_trips() {
    for s in ["qr_pending", "connecting", "connected", "disconnected", "failed"] {
        assert_eq!(SessionStatus::parse(s).as_str(), s);
    }
    for s in ["draft", "scheduled", "processing", "completed", "failed", "cancelled"] {
        assert_eq!(CampaignStatus::parse(s).as_str(), s);
    }
    for s in ["exact", "contains", "starts_with", "ends_with", "regex"] {
        assert_eq!(MatchMode::parse(s).as_str(), s);
    }
}

#[test]
fn campaign_pending_never_negative() {
    let row = CampaignRow {
        id: 1,
        user_id: 1,
        session_id: 1,
        name: "x".into(),
        template: Template {
            kind: MessageKind::Text,
            content: "hi".into(),
            media_url: None,
            caption: None,
            variables: None,
        },
        status: CampaignStatus::Processing,
        scheduled_at: None,
        started_at: None,
        completed_at: None,
        total: 5,
        sent: 4,
        failed: 2,
        batch_size: 20,
        batch_delay_ms: 60_000,
        created_at: Utc::now(),
    };
    assert_eq!(row.pending(), 0);
}
