// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure pacing math: reconnect backoff, adaptive send delays, human-like
//! typing and read-mark simulation. Everything random takes an explicit
//! `Rng` so tests can be deterministic.

use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff: `min(base * 2^(attempt-1), cap)`.
///
/// `attempt` is 1-based; attempt 0 is treated as 1.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let factor = 1u64 << exp;
    let millis = (base.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(millis).min(cap)
}

/// Adaptive inter-send delay: scales from `min` toward `max` with hourly
/// load, then applies multiplicative jitter in [-20%, +20%], clamped back
/// into [min, max].
pub fn adaptive_delay(
    min: Duration,
    max: Duration,
    hour_count: u32,
    hour_limit: u32,
    rng: &mut impl Rng,
) -> Duration {
    let min_ms = min.as_millis() as f64;
    let max_ms = max.as_millis() as f64;
    let load = if hour_limit == 0 { 1.0 } else { f64::from(hour_count) / f64::from(hour_limit) };
    let base = min_ms + (max_ms - min_ms) * load.clamp(0.0, 1.0);
    let jitter = rng.random_range(-0.2..=0.2);
    let delayed = (base * (1.0 + jitter)).clamp(min_ms, max_ms);
    Duration::from_millis(delayed as u64)
}

/// Simulated typing duration for an outbound reply:
/// `max(1.5s, words * 200ms + U(-1s, +1s))`, capped at 8s.
pub fn typing_delay(word_count: usize, rng: &mut impl Rng) -> Duration {
    let typed_ms = (word_count as i64).saturating_mul(200);
    let wobble_ms = rng.random_range(-1000..=1000);
    let ms = (typed_ms + wobble_ms).max(1500).min(8000);
    Duration::from_millis(ms as u64)
}

/// Short pause between the `paused` presence update and the actual send:
/// `U(300, 800)` ms.
pub fn pre_send_pause(rng: &mut impl Rng) -> Duration {
    Duration::from_millis(rng.random_range(300..=800))
}

/// Delay before marking an inbound message read: a 0.5-2s base plus ~50ms
/// per character of content, the length component capped at 3s.
pub fn read_mark_delay(content_len: usize, rng: &mut impl Rng) -> Duration {
    let base_ms = rng.random_range(500..=2000);
    let length_ms = (content_len as u64).saturating_mul(50).min(3000);
    Duration::from_millis(base_ms + length_ms)
}

/// Randomized pacing between scraped groups: `U(min, max)`.
pub fn inter_group_delay(min: Duration, max: Duration, rng: &mut impl Rng) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rng.random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

#[cfg(test)]
#[path = "pacing_tests.rs"]
mod tests;
