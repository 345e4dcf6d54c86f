// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::storage::sessions::NewSession;

fn storage_with_session() -> (Storage, i64) {
    let storage = Storage::open_in_memory().expect("open");
    let session = storage
        .create_session(NewSession {
            session_id: "s-1".into(),
            user_id: 1,
            name: "test".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("create session");
    (storage, session.id)
}

fn incoming(session_id: i64, message_id: &str) -> NewMessage {
    NewMessage {
        session_id,
        message_id: message_id.into(),
        direction: Direction::Incoming,
        message_type: MessageKind::Text,
        from_number: "628122222222".into(),
        to_number: "628111111111".into(),
        push_name: Some("Budi".into()),
        content: Some("hi".into()),
        media_meta: None,
        status: MessageStatus::Delivered,
        is_auto_reply: false,
        reply_source: None,
        reply_context: None,
    }
}

#[test]
fn duplicate_message_id_is_noop() {
    let (storage, sid) = storage_with_session();
    let first = storage.insert_message(incoming(sid, "m-42")).expect("insert");
    assert!(first.is_some());
    let second = storage.insert_message(incoming(sid, "m-42")).expect("insert again");
    assert!(second.is_none(), "re-insertion with the same id must be a no-op");

    let conn = storage.conn();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM whatsapp_messages", [], |r| r.get(0))
        .expect("count");
    assert_eq!(count, 1);
}

#[test]
fn status_never_regresses() {
    let (storage, sid) = storage_with_session();
    let mut msg = incoming(sid, "m-1");
    msg.status = MessageStatus::Pending;
    storage.insert_message(msg).expect("insert");

    let now = Utc::now();
    assert!(storage.advance_message_status("m-1", MessageStatus::Sent, now).expect("sent"));
    assert!(storage
        .advance_message_status("m-1", MessageStatus::Delivered, now)
        .expect("delivered"));
    // Regression is refused.
    assert!(!storage.advance_message_status("m-1", MessageStatus::Sent, now).expect("regress"));

    let row = storage.message_by_external("m-1").expect("get").expect("exists");
    assert_eq!(row.status, MessageStatus::Delivered);
    assert!(row.sent_at.is_some());
    assert!(row.delivered_at.is_some());
}

#[test]
fn failed_is_terminal() {
    let (storage, sid) = storage_with_session();
    let mut msg = incoming(sid, "m-2");
    msg.status = MessageStatus::Pending;
    storage.insert_message(msg).expect("insert");

    storage.fail_message("m-2", "rate limit exceeded").expect("fail");
    assert!(!storage
        .advance_message_status("m-2", MessageStatus::Sent, Utc::now())
        .expect("advance after fail"));

    let row = storage.message_by_external("m-2").expect("get").expect("exists");
    assert_eq!(row.status, MessageStatus::Failed);
    assert_eq!(row.failure_reason.as_deref(), Some("rate limit exceeded"));
}

#[test]
fn timestamps_only_advance_once() {
    let (storage, sid) = storage_with_session();
    let mut msg = incoming(sid, "m-3");
    msg.status = MessageStatus::Pending;
    storage.insert_message(msg).expect("insert");

    let t1 = Utc::now();
    storage.advance_message_status("m-3", MessageStatus::Sent, t1).expect("sent");
    let first = storage.message_by_external("m-3").expect("get").expect("row").sent_at;

    // A later read-advance must not disturb sent_at.
    storage
        .advance_message_status("m-3", MessageStatus::Read, t1 + chrono::Duration::seconds(5))
        .expect("read");
    let row = storage.message_by_external("m-3").expect("get").expect("row");
    assert_eq!(row.sent_at, first);
    assert!(row.read_at.is_some());
}

#[test]
fn history_is_two_way_and_bounded() {
    let (storage, sid) = storage_with_session();
    for i in 0..15 {
        let mut msg = incoming(sid, &format!("m-h-{i}"));
        if i % 2 == 0 {
            msg.direction = Direction::Outgoing;
            msg.from_number = "628111111111".into();
            msg.to_number = "628122222222".into();
        }
        msg.content = Some(format!("line {i}"));
        storage.insert_message(msg).expect("insert");
    }
    let history = storage.conversation_history(sid, "628122222222", 10).expect("history");
    assert_eq!(history.len(), 10);
    // Oldest first.
    assert_eq!(history[0].content.as_deref(), Some("line 5"));
    assert_eq!(history[9].content.as_deref(), Some("line 14"));
}
