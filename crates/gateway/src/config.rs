// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the chatgate server.
#[derive(Debug, Clone, clap::Parser)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CHATGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "CHATGATE_PORT")]
    pub port: u16,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "data/chatgate.db", env = "CHATGATE_DB_PATH")]
    pub db_path: String,

    /// Root directory for per-session transport credentials.
    #[arg(long, default_value = "data/sessions", env = "CHATGATE_SESSION_STORAGE")]
    pub session_storage_path: String,

    /// Comma-separated allowed CORS origins. Unset means permissive.
    #[arg(long, env = "CHATGATE_CORS_ORIGINS")]
    pub cors_origins: Option<String>,

    // -- Rate limiter -------------------------------------------------------

    /// Reserved for future sub-minute windowing.
    #[arg(long, default_value_t = 10, env = "CHATGATE_MESSAGES_PER_MINUTE")]
    pub messages_per_minute: u32,

    /// Hard hourly send ceiling per session.
    #[arg(long, default_value_t = 100, env = "CHATGATE_MESSAGES_PER_HOUR")]
    pub messages_per_hour: u32,

    /// Hard daily send ceiling per session.
    #[arg(long, default_value_t = 1000, env = "CHATGATE_MESSAGES_PER_DAY")]
    pub messages_per_day: u32,

    /// Lower bound of the adaptive inter-send delay.
    #[arg(long, default_value_t = 2000, env = "CHATGATE_MIN_DELAY_MS")]
    pub min_delay_ms: u64,

    /// Upper bound of the adaptive inter-send delay.
    #[arg(long, default_value_t = 5000, env = "CHATGATE_MAX_DELAY_MS")]
    pub max_delay_ms: u64,

    /// Hourly send count that arms the anti-abuse cooldown.
    #[arg(long, default_value_t = 50, env = "CHATGATE_COOLDOWN_AFTER_MESSAGES")]
    pub cooldown_after_messages: u32,

    /// Cooldown length once armed.
    #[arg(long, default_value_t = 300_000, env = "CHATGATE_COOLDOWN_DURATION_MS")]
    pub cooldown_duration_ms: u64,

    // -- Broadcast defaults -------------------------------------------------

    /// Recipients per batch before the inter-batch sleep.
    #[arg(long, default_value_t = 20, env = "CHATGATE_BROADCAST_BATCH_SIZE")]
    pub broadcast_batch_size: u32,

    /// Inter-batch sleep in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "CHATGATE_BROADCAST_BATCH_DELAY_MS")]
    pub broadcast_batch_delay_ms: u64,

    // -- Session lifecycle --------------------------------------------------

    /// Reconnect backoff base in milliseconds.
    #[arg(long, default_value_t = 3000, env = "CHATGATE_BACKOFF_BASE_MS")]
    pub backoff_base_ms: u64,

    /// Reconnect backoff cap in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "CHATGATE_BACKOFF_CAP_MS")]
    pub backoff_cap_ms: u64,

    /// Quick reconnect attempts before the long cool-off.
    #[arg(long, default_value_t = 20, env = "CHATGATE_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,

    /// Long cool-off after quick attempts are exhausted.
    #[arg(long, default_value_t = 120_000, env = "CHATGATE_RECONNECT_COOLOFF_MS")]
    pub reconnect_cooloff_ms: u64,

    /// Transport connect/query timeout in seconds.
    #[arg(long, default_value_t = 60, env = "CHATGATE_TRANSPORT_TIMEOUT_SECS")]
    pub transport_timeout_secs: u64,

    /// QR payload time-to-live in seconds.
    #[arg(long, default_value_t = 60, env = "CHATGATE_QR_TTL_SECS")]
    pub qr_ttl_secs: u64,

    // -- Inbound freshness --------------------------------------------------

    /// Freshness window for live-notify events, in seconds.
    #[arg(long, default_value_t = 300, env = "CHATGATE_FRESHNESS_NOTIFY_SECS")]
    pub freshness_notify_secs: u64,

    /// Freshness window for history-append events, in seconds.
    #[arg(long, default_value_t = 1800, env = "CHATGATE_FRESHNESS_APPEND_SECS")]
    pub freshness_append_secs: u64,

    // -- Scraper ------------------------------------------------------------

    /// Scraper pacing profile.
    #[arg(long, value_enum, default_value = "balanced", env = "CHATGATE_SCRAPE_PROFILE")]
    pub scrape_profile: ScrapeProfile,

    // -- Collaborators ------------------------------------------------------

    /// Base URL of the chat-protocol sidecar that owns the vendor library.
    #[arg(long, default_value = "http://127.0.0.1:3001", env = "CHATGATE_PROVIDER_URL")]
    pub provider_url: String,

    /// API key for the AI text-generation collaborator.
    #[arg(long, env = "CHATGATE_AI_API_KEY")]
    pub ai_api_key: Option<String>,

    /// Base URL for the AI collaborator.
    #[arg(long, default_value = "https://api.openai.com/v1", env = "CHATGATE_AI_BASE_URL")]
    pub ai_base_url: String,

    /// API key for the shipping-cost collaborator.
    #[arg(long, env = "CHATGATE_SHIPPING_API_KEY")]
    pub shipping_api_key: Option<String>,

    /// Base URL for the shipping-cost collaborator.
    #[arg(long, default_value = "https://api.rajaongkir.com/starter", env = "CHATGATE_SHIPPING_BASE_URL")]
    pub shipping_base_url: String,
}

impl GatewayConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn reconnect_cooloff(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooloff_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }

    pub fn broadcast_batch_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_batch_delay_ms)
    }

    pub fn scraper_limits(&self) -> ScraperLimits {
        self.scrape_profile.limits()
    }
}

/// Scraper pacing profile. One configuration blob; the scraper itself has a
/// single code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScrapeProfile {
    Safe,
    Balanced,
    Aggressive,
}

/// Concrete scraper pacing values derived from the profile.
#[derive(Debug, Clone, Copy)]
pub struct ScraperLimits {
    pub max_scrapes_per_day: u32,
    pub cooldown_between_scrapes: Duration,
    pub min_delay_between_groups: Duration,
    pub max_delay_between_groups: Duration,
    pub contacts_per_batch: usize,
    pub batch_save_delay: Duration,
    pub max_contacts_per_scrape: usize,
    pub lid_resolve_batch: usize,
}

impl ScrapeProfile {
    pub fn limits(&self) -> ScraperLimits {
        match self {
            Self::Safe => ScraperLimits {
                max_scrapes_per_day: 3,
                cooldown_between_scrapes: Duration::from_secs(4 * 3600),
                min_delay_between_groups: Duration::from_secs(8),
                max_delay_between_groups: Duration::from_secs(15),
                contacts_per_batch: 25,
                batch_save_delay: Duration::from_secs(3),
                max_contacts_per_scrape: 500,
                lid_resolve_batch: 50,
            },
            Self::Balanced => ScraperLimits {
                max_scrapes_per_day: 5,
                cooldown_between_scrapes: Duration::from_secs(2 * 3600),
                min_delay_between_groups: Duration::from_secs(5),
                max_delay_between_groups: Duration::from_secs(12),
                contacts_per_batch: 50,
                batch_save_delay: Duration::from_secs(2),
                max_contacts_per_scrape: 1000,
                lid_resolve_batch: 50,
            },
            Self::Aggressive => ScraperLimits {
                max_scrapes_per_day: 10,
                cooldown_between_scrapes: Duration::from_secs(3600),
                min_delay_between_groups: Duration::from_secs(3),
                max_delay_between_groups: Duration::from_secs(6),
                contacts_per_batch: 100,
                batch_save_delay: Duration::from_millis(800),
                max_contacts_per_scrape: 2000,
                lid_resolve_batch: 50,
            },
        }
    }
}
