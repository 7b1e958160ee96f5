//! Process configuration, read from the environment with the same
//! warn-and-default posture the rest of this workspace uses for
//! non-critical settings (§6).

use std::time::Duration;

/// `redisPort`/`redisHost` collapse to a single connection URL here —
/// the log backend is addressed the way every other Redis client in
/// this workspace is, by URL.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub stream_name: String,
    /// Service-side rehydration poll cadence is not actually used for
    /// polling (the service reads on demand); only the projector's
    /// subscription and pending sweep are timer-driven. Kept here
    /// because §6 names it as one configuration surface.
    pub read_interval: Duration,
    pub projector_read_interval: Duration,
    pub pending_interval: Duration,
    pub listen_port: u16,
    pub view_store_uri: String,
    pub view_store_database: String,
    pub view_store_collection: String,
}

impl Config {
    /// Load configuration from the environment, falling back to the
    /// defaults named in §6 and warning (never failing) when a value is
    /// missing.
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or_warn("REDIS_URL", "redis://127.0.0.1:6379"),
            stream_name: env_or_default("STREAM_NAME", "accountStream"),
            read_interval: Duration::from_secs(env_secs_or_default("READ_INTERVAL_SECS", 30)),
            projector_read_interval: Duration::from_secs(env_secs_or_default(
                "PROJECTOR_READ_INTERVAL_SECS",
                10,
            )),
            pending_interval: Duration::from_secs(env_secs_or_default("PENDING_INTERVAL_SECS", 30)),
            listen_port: env_secs_or_default("LISTEN_PORT", 8444) as u16,
            view_store_uri: env_or_warn("VIEW_STORE_URI", "mongodb://127.0.0.1:27017"),
            view_store_database: env_or_default("VIEW_STORE_DATABASE", "ledger"),
            view_store_collection: env_or_default("VIEW_STORE_COLLECTION", "accounts"),
        }
    }
}

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_warn(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        tracing::warn!(%key, default, "environment variable not set; using default");
        default.to_string()
    })
}

fn env_secs_or_default(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
