// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn opts() -> RateLimitOptions {
    RateLimitOptions {
        messages_per_minute: 10,
        messages_per_hour: 3,
        messages_per_day: 10,
        min_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(400),
        cooldown_after_messages: 50,
        cooldown_duration: Duration::from_secs(300),
    }
}

fn bucket() -> RateBucket {
    RateBucket {
        session_id: 1,
        messages_last_hour: 0,
        messages_today: 0,
        last_sent_at: None,
        cooldown_until: None,
    }
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(11)
}

#[test]
fn hour_ceiling_denies_fourth_send() {
    let opts = opts();
    let mut bucket = bucket();
    let mut r = rng();
    let now = Utc::now();

    for _ in 0..3 {
        let admission = admit(&mut bucket, &opts, now, &mut r);
        assert!(admission.can_send);
        record(&mut bucket, &opts, now);
    }

    let fourth = admit(&mut bucket, &opts, now, &mut r);
    assert!(!fourth.can_send);
    assert_eq!(fourth.reason, Some(DenyReason::HourLimit));
    assert_eq!(fourth.delay, Duration::from_secs(3600));
    assert!(fourth.reason.map(|r| r.message().contains("rate limit")).unwrap_or(false));
}

#[test]
fn hour_counter_resets_after_idle_hour() {
    let opts = opts();
    let mut bucket = bucket();
    let mut r = rng();
    let t0 = Utc::now();

    for _ in 0..3 {
        record(&mut bucket, &opts, t0);
    }
    assert!(!admit(&mut bucket, &opts, t0, &mut r).can_send);

    let later = t0 + chrono::Duration::hours(1);
    let admission = admit(&mut bucket, &opts, later, &mut r);
    assert!(admission.can_send, "hour counter should reset after an idle hour");
    assert_eq!(bucket.messages_last_hour, 0);
    // Day counter survives the hourly reset.
    assert_eq!(bucket.messages_today, 3);
}

#[test]
fn day_ceiling_denies_with_daily_delay() {
    let opts = opts();
    let mut bucket = bucket();
    let mut r = rng();
    let mut now = Utc::now();

    // Send the daily allowance across separate hours.
    for _ in 0..10 {
        if bucket.messages_last_hour >= opts.messages_per_hour {
            now += chrono::Duration::hours(1);
        }
        let admission = admit(&mut bucket, &opts, now, &mut r);
        assert!(admission.can_send);
        record(&mut bucket, &opts, now);
    }

    now += chrono::Duration::hours(1);
    let denied = admit(&mut bucket, &opts, now, &mut r);
    assert!(!denied.can_send);
    assert_eq!(denied.reason, Some(DenyReason::DayLimit));
    assert_eq!(denied.delay, Duration::from_secs(24 * 3600));
}

#[test]
fn cooldown_arms_at_threshold_and_blocks() {
    let opts = RateLimitOptions { cooldown_after_messages: 2, ..opts() };
    let mut bucket = bucket();
    let mut r = rng();
    let now = Utc::now();

    record(&mut bucket, &opts, now);
    assert!(bucket.cooldown_until.is_none());
    record(&mut bucket, &opts, now);
    assert!(bucket.cooldown_until.is_some(), "threshold send arms the cooldown");

    let denied = admit(&mut bucket, &opts, now, &mut r);
    assert!(!denied.can_send);
    assert_eq!(denied.reason, Some(DenyReason::Cooldown));
    assert!(denied.delay <= Duration::from_secs(300));
    assert!(denied.delay > Duration::from_secs(290));
}

#[test]
fn cooldown_clears_after_expiry() {
    let opts = RateLimitOptions { cooldown_after_messages: 1, ..opts() };
    let mut bucket = bucket();
    let mut r = rng();
    let t0 = Utc::now();

    record(&mut bucket, &opts, t0);
    assert!(!admit(&mut bucket, &opts, t0, &mut r).can_send);

    let later = t0 + chrono::Duration::seconds(301);
    let admission = admit(&mut bucket, &opts, later, &mut r);
    assert!(admission.can_send);
    assert!(bucket.cooldown_until.is_none());
}

#[test]
fn adaptive_delay_respects_envelope() {
    let opts = RateLimitOptions { messages_per_hour: 100, ..opts() };
    let mut bucket = bucket();
    let mut r = rng();
    let now = Utc::now();
    for count in [0u32, 25, 50, 99] {
        bucket.messages_last_hour = count;
        let admission = admit(&mut bucket, &opts, now, &mut r);
        assert!(admission.can_send);
        assert!(admission.delay >= opts.min_delay);
        assert!(admission.delay <= opts.max_delay);
    }
}

#[test]
fn storage_backed_limiter_round_trips() {
    let storage = Arc::new(Storage::open_in_memory().expect("open"));
    let session = storage
        .create_session(crate::storage::sessions::NewSession {
            session_id: "s-1".into(),
            user_id: 1,
            name: "t".into(),
            ai_assistant_type: None,
            ai_config: None,
            webhook_url: None,
            settings: None,
        })
        .expect("session");

    let limiter = RateLimiter::new(
        Arc::clone(&storage),
        RateLimitOptions { messages_per_hour: 2, ..opts() },
    );

    assert!(limiter.check(session.id).expect("check").can_send);
    limiter.record_sent(session.id).expect("record");
    limiter.record_sent(session.id).expect("record");

    let denied = limiter.check(session.id).expect("check");
    assert!(!denied.can_send);

    // Counters survived the round trip through the row.
    let persisted = storage.rate_bucket(session.id).expect("bucket");
    assert_eq!(persisted.messages_last_hour, 2);
    assert_eq!(persisted.messages_today, 2);
    assert!(persisted.last_sent_at.is_some());
}
