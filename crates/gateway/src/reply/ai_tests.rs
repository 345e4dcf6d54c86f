// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use crate::model::SessionStatus;

fn session(ai_type: Option<&str>, ai_config: Option<serde_json::Value>) -> SessionRow {
    SessionRow {
        id: 1,
        session_id: "s-1".into(),
        user_id: 1,
        name: "Toko Maju".into(),
        phone_number: Some("628111".into()),
        status: SessionStatus::Connected,
        qr_code: None,
        qr_expires_at: None,
        ai_assistant_type: ai_type.map(str::to_owned),
        ai_config,
        webhook_url: None,
        settings: serde_json::json!({}),
        last_connected_at: None,
        last_disconnected_at: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

#[test]
fn category_prefers_assistant_type() {
    let s = session(Some("sales"), Some(serde_json::json!({"agent_category": "technical_support"})));
    assert_eq!(category_for(&s), AssistantCategory::Sales);
}

#[test]
fn category_falls_back_to_ai_config() {
    let s = session(None, Some(serde_json::json!({"agent_category": "technical_support"})));
    assert_eq!(category_for(&s), AssistantCategory::TechnicalSupport);
}

#[test]
fn unknown_category_is_general() {
    let s = session(Some("astrologer"), None);
    assert_eq!(category_for(&s), AssistantCategory::General);
    assert_eq!(category_for(&session(None, None)), AssistantCategory::General);
}

#[test]
fn system_prompt_mentions_business_name() {
    let s = session(Some("customer_service"), None);
    let prompt = system_prompt(&s);
    assert!(prompt.contains("customer service"));
    assert!(prompt.contains("Toko Maju"));
}

#[test]
fn custom_system_prompt_wins() {
    let mut s = session(Some("sales"), None);
    s.settings = serde_json::json!({"customSystemPrompt": "Jawab singkat saja."});
    assert_eq!(system_prompt(&s), "Jawab singkat saja.");
}

#[test]
fn each_category_has_distinct_prompt() {
    let prompts: Vec<&str> = [
        AssistantCategory::Sales,
        AssistantCategory::CustomerService,
        AssistantCategory::TechnicalSupport,
        AssistantCategory::General,
    ]
    .iter()
    .map(|c| c.base_prompt())
    .collect();
    for (i, a) in prompts.iter().enumerate() {
        for b in prompts.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}
