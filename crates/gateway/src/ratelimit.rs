// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adaptive per-session rate limiter. Counters live in the session's rate
//! bucket row; the admission math is pure over an explicit `now` so tests
//! control time. Windows reset on the first activity after expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::model::RateBucket;
use crate::pacing;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    /// Reserved for future sub-minute windowing.
    pub messages_per_minute: u32,
    pub messages_per_hour: u32,
    pub messages_per_day: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub cooldown_after_messages: u32,
    pub cooldown_duration: Duration,
}

impl RateLimitOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            messages_per_minute: config.messages_per_minute,
            messages_per_hour: config.messages_per_hour,
            messages_per_day: config.messages_per_day,
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            cooldown_after_messages: config.cooldown_after_messages,
            cooldown_duration: Duration::from_millis(config.cooldown_duration_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Cooldown,
    HourLimit,
    DayLimit,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Cooldown => "rate limit: cooldown active",
            Self::HourLimit => "rate limit: hourly message ceiling reached",
            Self::DayLimit => "rate limit: daily message ceiling reached",
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub can_send: bool,
    pub delay: Duration,
    pub reason: Option<DenyReason>,
}

/// Refresh windowed counters in place: zero the hour counter after an hour
/// of silence, the day counter after a day, and drop an elapsed cooldown.
pub fn refresh(bucket: &mut RateBucket, now: DateTime<Utc>) {
    if let Some(last) = bucket.last_sent_at {
        let idle = now.signed_duration_since(last);
        if idle >= chrono::Duration::hours(1) {
            bucket.messages_last_hour = 0;
        }
        if idle >= chrono::Duration::hours(24) {
            bucket.messages_today = 0;
        }
    }
    if let Some(until) = bucket.cooldown_until {
        if until <= now {
            bucket.cooldown_until = None;
        }
    }
}

/// Pure admission decision. Mutates the bucket only by refreshing windows.
pub fn admit(
    bucket: &mut RateBucket,
    opts: &RateLimitOptions,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Admission {
    refresh(bucket, now);

    if let Some(until) = bucket.cooldown_until {
        let remaining = until.signed_duration_since(now);
        let delay = remaining.to_std().unwrap_or(Duration::ZERO);
        return Admission { can_send: false, delay, reason: Some(DenyReason::Cooldown) };
    }

    if bucket.messages_last_hour >= opts.messages_per_hour {
        return Admission {
            can_send: false,
            delay: Duration::from_secs(3600),
            reason: Some(DenyReason::HourLimit),
        };
    }

    if bucket.messages_today >= opts.messages_per_day {
        return Admission {
            can_send: false,
            delay: Duration::from_secs(24 * 3600),
            reason: Some(DenyReason::DayLimit),
        };
    }

    let delay = pacing::adaptive_delay(
        opts.min_delay,
        opts.max_delay,
        bucket.messages_last_hour,
        opts.messages_per_hour,
        rng,
    );
    Admission { can_send: true, delay, reason: None }
}

/// Account one completed send and arm the cooldown at the threshold.
pub fn record(bucket: &mut RateBucket, opts: &RateLimitOptions, now: DateTime<Utc>) {
    refresh(bucket, now);
    bucket.messages_last_hour = bucket.messages_last_hour.saturating_add(1);
    bucket.messages_today = bucket.messages_today.saturating_add(1);
    bucket.last_sent_at = Some(now);
    if bucket.messages_last_hour >= opts.cooldown_after_messages {
        let cooldown = chrono::Duration::from_std(opts.cooldown_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        bucket.cooldown_until = Some(now + cooldown);
    }
}

/// Storage-backed limiter shared by auto-reply, broadcasts and one-shot
/// sends. The storage mutex serializes concurrent bucket access.
pub struct RateLimiter {
    storage: Arc<Storage>,
    opts: RateLimitOptions,
}

impl RateLimiter {
    pub fn new(storage: Arc<Storage>, opts: RateLimitOptions) -> Self {
        Self { storage, opts }
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.opts
    }

    /// Admission check for a session (by internal row id). Refreshed
    /// counters are persisted even on denial.
    pub fn check(&self, session_db_id: i64) -> Result<Admission, GatewayError> {
        let mut bucket = self.storage.rate_bucket(session_db_id)?;
        let admission = admit(&mut bucket, &self.opts, Utc::now(), &mut rand::rng());
        self.storage.save_rate_bucket(&bucket)?;
        Ok(admission)
    }

    /// Record one completed send.
    pub fn record_sent(&self, session_db_id: i64) -> Result<(), GatewayError> {
        let mut bucket = self.storage.rate_bucket(session_db_id)?;
        record(&mut bucket, &self.opts, Utc::now());
        self.storage.save_rate_bucket(&bucket)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
