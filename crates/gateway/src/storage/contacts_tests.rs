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

#[test]
fn upsert_merges_push_name() {
    let (storage, sid) = storage_with_session();
    storage
        .upsert_contact(1, sid, ContactUpsert { phone: "628123".into(), ..Default::default() })
        .expect("insert");
    storage
        .upsert_contact(
            1,
            sid,
            ContactUpsert {
                phone: "628123".into(),
                push_name: Some("Budi".into()),
                ..Default::default()
            },
        )
        .expect("merge");
    let row = storage.contact_by_phone(1, sid, "628123").expect("get").expect("exists");
    assert_eq!(row.push_name.as_deref(), Some("Budi"));
}

#[test]
fn human_display_name_is_never_clobbered() {
    let (storage, sid) = storage_with_session();
    storage
        .upsert_contact(1, sid, ContactUpsert { phone: "628123".into(), ..Default::default() })
        .expect("insert");
    storage.rename_contact(1, sid, "628123", "Pak Budi").expect("rename");

    storage
        .upsert_contact(
            1,
            sid,
            ContactUpsert {
                phone: "628123".into(),
                display_name: Some("scraped name".into()),
                push_name: Some("budi99".into()),
                ..Default::default()
            },
        )
        .expect("merge");

    let row = storage.contact_by_phone(1, sid, "628123").expect("get").expect("exists");
    assert_eq!(row.display_name.as_deref(), Some("Pak Budi"));
    assert_eq!(row.push_name.as_deref(), Some("budi99"));
}

#[test]
fn null_new_values_do_not_erase() {
    let (storage, sid) = storage_with_session();
    storage
        .upsert_contact(
            1,
            sid,
            ContactUpsert {
                phone: "628123".into(),
                push_name: Some("Budi".into()),
                ..Default::default()
            },
        )
        .expect("insert");
    storage
        .upsert_contact(1, sid, ContactUpsert { phone: "628123".into(), ..Default::default() })
        .expect("merge with nulls");
    let row = storage.contact_by_phone(1, sid, "628123").expect("get").expect("exists");
    assert_eq!(row.push_name.as_deref(), Some("Budi"));
}

#[test]
fn contacts_are_scoped_per_session_and_user() {
    let (storage, sid) = storage_with_session();
    let other = storage
        .create_session(NewSession {
            session_id: "s-2".into(),
            user_id: 2,
            name: "other".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("second session");

    storage
        .upsert_contact(1, sid, ContactUpsert { phone: "628123".into(), ..Default::default() })
        .expect("insert");
    storage
        .upsert_contact(2, other.id, ContactUpsert { phone: "628123".into(), ..Default::default() })
        .expect("insert other");

    assert_eq!(storage.list_contacts(1, sid).expect("list").len(), 1);
    assert_eq!(storage.list_contacts(2, other.id).expect("list").len(), 1);
    assert!(storage.contact_by_phone(2, sid, "628123").expect("get").is_none());
}
