//! Worker configuration loaded from the environment.

use std::time::Duration;

use core_config::{
    env_duration_ms, env_duration_secs, env_parse_or, ConfigError, FromEnv, HttpConfig,
};

/// Tuning knobs for the relay worker.
///
/// Every field has a production-safe default and can be overridden through a
/// `RELAY_*` environment variable.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address for the ingress and health HTTP server.
    pub http: HttpConfig,
    /// How long a received message stays hidden from other consumers.
    pub visibility_timeout: Duration,
    /// How many messages to request per queue receive.
    pub prefetch_count: usize,
    /// Visibility window granted by each keep-alive renewal.
    pub keepalive_extension: Duration,
    /// Deliveries before a failing event is dropped.
    pub max_attempts: u32,
    /// Base delay before the first retry; doubles per attempt.
    pub retry_delay: Duration,
    /// Pause between polls when the queue is empty.
    pub idle_delay: Duration,
    /// Heartbeat age beyond which readiness probes fail.
    pub heartbeat_staleness: Duration,
}

impl FromEnv for Settings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpConfig::from_env()?,
            visibility_timeout: env_duration_secs(
                "RELAY_VISIBILITY_TIMEOUT_SECS",
                Duration::from_secs(30),
            )?,
            prefetch_count: env_parse_or("RELAY_PREFETCH_COUNT", 4usize)?,
            keepalive_extension: env_duration_secs(
                "RELAY_KEEPALIVE_EXTENSION_SECS",
                Duration::from_secs(30),
            )?,
            max_attempts: env_parse_or("RELAY_MAX_ATTEMPTS", 5u32)?,
            retry_delay: env_duration_ms("RELAY_RETRY_DELAY_MS", Duration::from_secs(5))?,
            idle_delay: env_duration_ms("RELAY_IDLE_DELAY_MS", Duration::from_millis(250))?,
            heartbeat_staleness: env_duration_secs(
                "RELAY_HEARTBEAT_STALENESS_SECS",
                Duration::from_secs(60),
            )?,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            visibility_timeout: Duration::from_secs(30),
            prefetch_count: 4,
            keepalive_extension: Duration::from_secs(30),
            max_attempts: 5,
            retry_delay: Duration::from_secs(5),
            idle_delay: Duration::from_millis(250),
            heartbeat_staleness: Duration::from_secs(60),
        }
    }
}
