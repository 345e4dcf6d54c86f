// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn normalize_rewrites_leading_zero() {
    assert_eq!(normalize_phone("081234567890"), "6281234567890");
    assert_eq!(normalize_phone("6281234567890"), "6281234567890");
    assert_eq!(normalize_phone("+62 812-3456-7890"), "6281234567890");
}

#[test]
fn normalize_is_idempotent() {
    for raw in ["081234567890", "6281234567890", "+62 812 3456", "0044 20 7946"] {
        let once = normalize_phone(raw);
        assert_eq!(normalize_phone(&once), once, "not idempotent for {raw}");
    }
}

#[test]
fn phone_jid_parses_to_phone() {
    let id = parse_identity("6281234567890@s.whatsapp.net");
    assert_eq!(id, Identity::Phone("6281234567890".into()));
    assert_eq!(id.phone(), Some("6281234567890"));
    assert!(!id.is_lid());
}

#[test]
fn device_suffix_is_stripped() {
    let id = parse_identity("6281234567890:12@s.whatsapp.net");
    assert_eq!(id, Identity::Phone("6281234567890".into()));
}

#[test]
fn lid_server_marker_is_lid() {
    let id = parse_identity("123456789012@lid");
    assert!(id.is_lid());
    assert_eq!(id.record_key(), "LID_123456789012");
    assert_eq!(id.phone(), None);
}

#[test]
fn overlong_digits_are_lid() {
    let id = parse_identity("1234567890123456789@s.whatsapp.net");
    assert!(id.is_lid());
}

#[test]
fn group_messages_use_participant_identity() {
    let id = sender_identity("12036312345@g.us", Some("628111@s.whatsapp.net"));
    assert_eq!(id, Identity::Phone("628111".into()));

    let direct = sender_identity("628111@s.whatsapp.net", None);
    assert_eq!(direct, Identity::Phone("628111".into()));
}

#[test]
fn group_jid_detection() {
    assert!(is_group_jid("12036312345@g.us"));
    assert!(!is_group_jid("628111@s.whatsapp.net"));
    assert!(!is_group_jid("123456@lid"));
}
