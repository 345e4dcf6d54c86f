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
fn member_upsert_refreshes_counts() {
    let (storage, sid) = storage_with_session();
    let gid = storage
        .upsert_group(
            1,
            sid,
            GroupUpsert { group_jid: "g-1@g.us".into(), name: "Team".into(), ..Default::default() },
        )
        .expect("group");

    storage
        .upsert_group_member(
            gid,
            MemberUpsert {
                participant_jid: "628111@s.whatsapp.net".into(),
                phone: Some("628111".into()),
                is_admin: true,
                ..Default::default()
            },
        )
        .expect("member 1");
    storage
        .upsert_group_member(
            gid,
            MemberUpsert {
                participant_jid: "628222@s.whatsapp.net".into(),
                phone: Some("628222".into()),
                ..Default::default()
            },
        )
        .expect("member 2");

    let group = storage.group_by_id(gid).expect("get").expect("exists");
    assert_eq!(group.participant_count, 2);
    assert_eq!(group.admin_count, 1);
}

#[test]
fn member_upsert_is_idempotent_per_jid() {
    let (storage, sid) = storage_with_session();
    let gid = storage
        .upsert_group(
            1,
            sid,
            GroupUpsert { group_jid: "g-1@g.us".into(), name: "Team".into(), ..Default::default() },
        )
        .expect("group");

    for _ in 0..3 {
        storage
            .upsert_group_member(
                gid,
                MemberUpsert {
                    participant_jid: "628111@s.whatsapp.net".into(),
                    ..Default::default()
                },
            )
            .expect("member");
    }
    let group = storage.group_by_id(gid).expect("get").expect("exists");
    assert_eq!(group.participant_count, 1);
}

#[test]
fn group_upsert_updates_in_place() {
    let (storage, sid) = storage_with_session();
    let first = storage
        .upsert_group(
            1,
            sid,
            GroupUpsert {
                group_jid: "g-1@g.us".into(),
                name: "Old".into(),
                participant_count: 10,
                ..Default::default()
            },
        )
        .expect("group");
    let second = storage
        .upsert_group(
            1,
            sid,
            GroupUpsert {
                group_jid: "g-1@g.us".into(),
                name: "New".into(),
                participant_count: 12,
                ..Default::default()
            },
        )
        .expect("group again");
    assert_eq!(first, second);

    let group = storage.group_by_jid(1, sid, "g-1@g.us").expect("get").expect("exists");
    assert_eq!(group.name, "New");
    assert_eq!(group.participant_count, 12);
    assert_eq!(storage.list_groups(1, sid).expect("list").len(), 1);
}

#[test]
fn lid_members_keep_flag() {
    let (storage, sid) = storage_with_session();
    let gid = storage
        .upsert_group(
            1,
            sid,
            GroupUpsert { group_jid: "g-1@g.us".into(), name: "Team".into(), ..Default::default() },
        )
        .expect("group");
    storage
        .upsert_group_member(
            gid,
            MemberUpsert {
                participant_jid: "123456789012345678@lid".into(),
                phone: None,
                is_lid: true,
                ..Default::default()
            },
        )
        .expect("member");
    let members = storage.list_group_members(gid).expect("list");
    assert_eq!(members.len(), 1);
    assert!(members[0].is_lid);
    assert!(members[0].phone.is_none());
}
