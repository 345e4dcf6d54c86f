// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn rule(id: i64, pattern: &str, mode: MatchMode, priority: i64) -> RuleRow {
    RuleRow {
        id,
        session_id: 1,
        pattern: pattern.into(),
        match_mode: mode,
        reply: format!("reply-{id}"),
        priority,
        is_active: true,
    }
}

#[test]
fn case_insensitive_for_plain_modes() {
    let rules = vec![rule(1, "HALO", MatchMode::Exact, 0)];
    assert!(first_match(&rules, "halo").is_some());
    assert!(first_match(&rules, "  Halo  ").is_some());
    assert!(first_match(&rules, "halo dunia").is_none());
}

#[test]
fn contains_starts_ends() {
    let rules = vec![
        rule(1, "harga", MatchMode::Contains, 0),
        rule(2, "promo", MatchMode::StartsWith, 0),
        rule(3, "?", MatchMode::EndsWith, 0),
    ];
    assert_eq!(first_match(&rules, "berapa harga barang ini").map(|r| r.id), Some(1));
    assert_eq!(first_match(&rules, "promo bulan ini").map(|r| r.id), Some(2));
    assert_eq!(first_match(&rules, "ada stok?").map(|r| r.id), Some(3));
}

#[test]
fn regex_is_case_sensitive_raw() {
    let rules = vec![rule(1, r"^ORDER-\d+$", MatchMode::Regex, 0)];
    assert!(first_match(&rules, "ORDER-123").is_some());
    assert!(first_match(&rules, "order-123").is_none());
}

#[test]
fn invalid_regex_never_matches() {
    let rules = vec![rule(1, r"([unclosed", MatchMode::Regex, 0)];
    assert!(first_match(&rules, "([unclosed").is_none());
}

#[test]
fn pre_sorted_order_decides_ties() {
    // Storage sorts priority DESC, id ASC; the matcher just takes the
    // first hit.
    let rules = vec![
        rule(2, "halo", MatchMode::Contains, 10),
        rule(1, "halo", MatchMode::Contains, 0),
    ];
    assert_eq!(first_match(&rules, "halo").map(|r| r.id), Some(2));
}

#[test]
fn inactive_rules_are_skipped() {
    let mut inactive = rule(1, "halo", MatchMode::Contains, 10);
    inactive.is_active = false;
    let rules = vec![inactive, rule(2, "halo", MatchMode::Contains, 0)];
    assert_eq!(first_match(&rules, "halo").map(|r| r.id), Some(2));
}
