// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scraper tests: source priority and dedup, LID resolution, quota and
//! cooldown enforcement, and the audit log.

use std::time::Duration;

use chrono::{TimeZone, Utc};

use chatgate::error::ErrorKind;
use chatgate::model::ScrapeStatus;
use chatgate::testkit::{harness, TestHarness};
use chatgate::upstream::{DirectoryEntry, GroupInfo, ParticipantInfo, TransportEvent};

async fn connected_session(h: &TestHarness, session_id: &str) -> i64 {
    h.state
        .storage
        .create_session(chatgate::storage::sessions::NewSession {
            session_id: session_id.to_owned(),
            user_id: 1,
            name: "Toko Maju".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("create session row");
    h.state.manager.create(session_id, 1).await.expect("start driver");
    for _ in 0..100 {
        if h.network
            .emit(
                session_id,
                TransportEvent::PairingSuccess { phone: "628111111111".to_owned() },
            )
            .await
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for _ in 0..100 {
        if h.state.manager.is_connected(session_id).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    h.state.storage.session_by_external(session_id).expect("q").expect("row").id
}

fn entry(jid: &str, phone: Option<&str>) -> DirectoryEntry {
    DirectoryEntry {
        jid: jid.to_owned(),
        phone: phone.map(str::to_owned),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn dedups_across_sources_and_resolves_lids() {
    let h = harness();
    let session_db_id = connected_session(&h, "s-1").await;

    {
        let transport = h.network.transport("s-1").expect("transport");
        // Same phone in store and chat list: one contact.
        transport
            .directory
            .lock()
            .expect("lock")
            .push(entry("628122222222@s.whatsapp.net", Some("628122222222")));
        transport
            .chat_list
            .lock()
            .expect("lock")
            .push(entry("628122222222@s.whatsapp.net", None));
        // A group with one phone participant and two LIDs.
        transport.group_list.lock().expect("lock").push(GroupInfo {
            jid: "g-1@g.us".into(),
            name: "Team".into(),
            ..Default::default()
        });
        transport.participants.lock().expect("lock").insert(
            "g-1@g.us".into(),
            vec![
                ParticipantInfo { jid: "628133333333@s.whatsapp.net".into(), ..Default::default() },
                ParticipantInfo { jid: "111222333444555666@lid".into(), ..Default::default() },
                ParticipantInfo { jid: "999888777666555444@lid".into(), ..Default::default() },
            ],
        );
        // Only the first LID resolves.
        transport
            .lid_map
            .lock()
            .expect("lock")
            .insert("111222333444555666".into(), "628144444444".into());
    }

    let outcome = h.state.scraper.scrape_contacts(1, "s-1").await.expect("scrape");
    assert_eq!(outcome.total, 4);

    let contacts = h.state.storage.list_contacts(1, session_db_id).expect("list");
    let phones: Vec<&str> = contacts.iter().map(|c| c.phone.as_str()).collect();
    assert!(phones.contains(&"628122222222"));
    assert!(phones.contains(&"628133333333"));
    assert!(phones.contains(&"628144444444"), "resolved LID becomes a phone: {phones:?}");
    assert!(phones.contains(&"LID_999888777666555444"), "unresolved LID keeps pseudo id");

    let lid_contact = contacts
        .iter()
        .find(|c| c.phone == "LID_999888777666555444")
        .expect("lid contact");
    assert_eq!(lid_contact.metadata["isLidFormat"], true);

    let logs = h.state.storage.list_scrape_logs(1, session_db_id, 10).expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, ScrapeStatus::Completed);
    assert_eq!(logs[0].total, 4);
}

#[tokio::test(start_paused = true)]
async fn second_scrape_inside_cooldown_is_rate_limited() {
    let h = harness();
    let session_db_id = connected_session(&h, "s-1").await;

    // A scrape completed half a cooldown ago.
    let half_cooldown_ago = Utc::now() - chrono::Duration::minutes(30);
    let log = h
        .state
        .storage
        .start_scrape_log(1, session_db_id, "contacts", half_cooldown_ago)
        .expect("log");
    h.state.storage.complete_scrape_log(log, 5, half_cooldown_ago).expect("complete");

    let err = h.state.scraper.scrape_contacts(1, "s-1").await.err().expect("denied");
    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert!(err.message.contains("minutes"), "got: {}", err.message);
    assert!(err.retry_after_ms.unwrap_or(0) > 0);

    // No audit row for the refused attempt.
    let logs = h.state.storage.list_scrape_logs(1, session_db_id, 10).expect("logs");
    assert_eq!(logs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scrape_proceeds_after_cooldown_elapses() {
    let h = harness();
    let session_db_id = connected_session(&h, "s-1").await;

    // Last completed scrape just beyond the aggressive-profile cooldown.
    let past = Utc::now() - chrono::Duration::minutes(61);
    let log = h
        .state
        .storage
        .start_scrape_log(1, session_db_id, "contacts", past)
        .expect("log");
    h.state.storage.complete_scrape_log(log, 5, past).expect("complete");

    let outcome = h.state.scraper.scrape_contacts(1, "s-1").await.expect("allowed");
    assert_eq!(outcome.total, 0, "mock directory is empty");
}

#[tokio::test]
async fn quota_snapshot_counts_calendar_day() {
    let h = harness();
    let session_db_id = connected_session(&h, "s-1").await;

    // Fixed clock: noon. Three completed scrapes this morning, one
    // yesterday evening.
    let noon = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).single().expect("ts");
    for hour in [8, 9, 10] {
        let at = Utc.with_ymd_and_hms(2026, 6, 15, hour, 0, 0).single().expect("ts");
        let log = h.state.storage.start_scrape_log(1, session_db_id, "contacts", at).expect("log");
        h.state.storage.complete_scrape_log(log, 1, at).expect("complete");
    }
    let yesterday = Utc.with_ymd_and_hms(2026, 6, 14, 22, 0, 0).single().expect("ts");
    let log =
        h.state.storage.start_scrape_log(1, session_db_id, "contacts", yesterday).expect("log");
    h.state.storage.complete_scrape_log(log, 1, yesterday).expect("complete");

    let snapshot = h.state.scraper.quota_snapshot(1, session_db_id, noon).expect("snapshot");
    assert_eq!(snapshot.scrapes_today, 3, "yesterday's scrape does not count");
    // Last completed 10:00, aggressive cooldown 1h: clear by noon.
    assert_eq!(snapshot.cooldown_remaining_secs, None);
    assert!(snapshot.can_scrape);

    // Shortly after the latest scrape, the cooldown shows up.
    let soon = Utc.with_ymd_and_hms(2026, 6, 15, 10, 30, 0).single().expect("ts");
    let snapshot = h.state.scraper.quota_snapshot(1, session_db_id, soon).expect("snapshot");
    assert_eq!(snapshot.cooldown_remaining_secs, Some(1800));
    assert!(!snapshot.can_scrape);
}

#[tokio::test(start_paused = true)]
async fn refused_scrape_leaves_no_audit_row() {
    let h = harness();
    let session_db_id = connected_session(&h, "s-1").await;

    // Connectivity is checked before the audit row is written.
    h.state.manager.disconnect("s-1").await.expect("disconnect");

    let err = h.state.scraper.scrape_contacts(1, "s-1").await.err().expect("fails");
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);

    // The refused attempt happened before the audit row: nothing logged,
    // quota untouched.
    let logs = h.state.storage.list_scrape_logs(1, session_db_id, 10).expect("logs");
    assert!(logs.is_empty());
    let snapshot =
        h.state.scraper.quota_snapshot(1, session_db_id, Utc::now()).expect("snapshot");
    assert_eq!(snapshot.scrapes_today, 0);
}

#[tokio::test(start_paused = true)]
async fn group_scrape_persists_groups_and_members() {
    let h = harness();
    let session_db_id = connected_session(&h, "s-1").await;

    {
        let transport = h.network.transport("s-1").expect("transport");
        transport.group_list.lock().expect("lock").extend([
            GroupInfo { jid: "g-1@g.us".into(), name: "Team".into(), ..Default::default() },
            GroupInfo {
                jid: "g-2@g.us".into(),
                name: "Announcements".into(),
                is_announce: true,
                ..Default::default()
            },
        ]);
        transport.participants.lock().expect("lock").insert(
            "g-1@g.us".into(),
            vec![
                ParticipantInfo {
                    jid: "628122222222@s.whatsapp.net".into(),
                    is_admin: true,
                    ..Default::default()
                },
                ParticipantInfo { jid: "628133333333@s.whatsapp.net".into(), ..Default::default() },
            ],
        );
    }

    let outcome = h.state.scraper.scrape_groups(1, "s-1").await.expect("scrape");
    assert_eq!(outcome.total, 2);

    let groups = h.state.storage.list_groups(1, session_db_id).expect("list");
    assert_eq!(groups.len(), 2);
    let team = groups.iter().find(|g| g.group_jid == "g-1@g.us").expect("team");
    assert_eq!(team.participant_count, 2);
    assert_eq!(team.admin_count, 1);

    let members = h.state.storage.list_group_members(team.id).expect("members");
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|m| m.is_admin));
}
