use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("unknown rate limit store {0:?}, expected REDIS or LRU")]
    UnknownRateLimitStore(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum IpRateLimitStore {
    #[serde(rename = "REDIS")]
    Redis,
    #[serde(rename = "LRU")]
    Lru,
}

/// Raw shape deserialized straight from the environment via `envy`. Boolean
/// and duration fields are kept as the primitives `envy` understands;
/// [`GatewayConfig::from_env`] turns them into the richer types the rest of
/// the crate consumes.
#[derive(Deserialize)]
struct RawConfig {
    chain_id: u64,
    #[serde(default)]
    rate_limit_disabled: bool,
    ip_rate_limit_store: Option<IpRateLimitStore>,
    #[serde(default)]
    redis_enabled: bool,
    redis_url: Option<String>,
    #[serde(default = "default_redis_reconnect_delay_ms")]
    redis_reconnect_delay_ms: u64,
    #[serde(default = "default_cache_ttl")]
    cache_ttl: u64,
    #[serde(default = "default_cache_max")]
    cache_max: usize,
    #[serde(default = "default_ws_connection_limit")]
    ws_connection_limit: usize,
    #[serde(default = "default_ws_connection_limit_per_ip")]
    ws_connection_limit_per_ip: usize,
    #[serde(default = "default_ws_max_inactivity_ttl")]
    ws_max_inactivity_ttl: u64,
    #[serde(default = "default_ws_subscription_limit")]
    ws_subscription_limit: usize,
    #[serde(default = "default_ws_polling_interval")]
    ws_polling_interval: u64,
    #[serde(default)]
    ws_new_heads_enabled: bool,
    #[serde(default = "default_true")]
    ws_same_sub_for_same_event: bool,
    #[serde(default = "default_cache_ttl")]
    ws_cache_ttl: u64,
    #[serde(default = "default_limit_duration")]
    limit_duration: u64,
    #[serde(default)]
    debug_api_enabled: bool,
    #[serde(default = "default_true")]
    subscriptions_enabled: bool,
    #[serde(default = "default_rate_limit")]
    default_rate_limit: u32,
    archive_base_url: String,
    #[serde(default = "default_archive_timeout_ms")]
    archive_timeout_ms: u64,
    #[serde(default = "default_archive_max_retries")]
    archive_max_retries: u32,
    consensus_endpoint: String,
    client_version: Option<String>,
    #[serde(default = "default_http_addr")]
    http_addr: String,
}

fn default_http_addr() -> String {
    "0.0.0.0:8545".to_string()
}

fn default_redis_reconnect_delay_ms() -> u64 {
    500
}
fn default_cache_ttl() -> u64 {
    1000
}
fn default_cache_max() -> usize {
    1000
}
fn default_ws_connection_limit() -> usize {
    10_000
}
fn default_ws_connection_limit_per_ip() -> usize {
    10
}
fn default_ws_max_inactivity_ttl() -> u64 {
    5 * 60 * 1000
}
fn default_ws_subscription_limit() -> usize {
    10
}
fn default_ws_polling_interval() -> u64 {
    500
}
fn default_limit_duration() -> u64 {
    1000
}
fn default_rate_limit() -> u32 {
    200
}
fn default_true() -> bool {
    true
}
fn default_archive_timeout_ms() -> u64 {
    5_000
}
fn default_archive_max_retries() -> u32 {
    2
}

/// Fully resolved gateway configuration. Built once at startup from the
/// process environment; no config files.
pub struct GatewayConfig {
    pub chain_id: u64,
    pub rate_limit_disabled: bool,
    pub ip_rate_limit_store: IpRateLimitStore,
    pub redis_enabled: bool,
    pub redis_url: Option<String>,
    pub redis_reconnect_delay: Duration,
    pub cache_ttl: Duration,
    pub cache_max: usize,
    pub ws_connection_limit: usize,
    pub ws_connection_limit_per_ip: usize,
    pub ws_max_inactivity_ttl: Duration,
    pub ws_subscription_limit: usize,
    pub ws_polling_interval: Duration,
    pub ws_new_heads_enabled: bool,
    pub ws_same_sub_for_same_event: bool,
    pub ws_cache_ttl: Duration,
    pub limit_duration: Duration,
    pub debug_api_enabled: bool,
    pub subscriptions_enabled: bool,
    pub default_rate_limit: u32,
    pub archive_base_url: String,
    pub archive_timeout: Duration,
    pub archive_max_retries: u32,
    pub consensus_endpoint: String,
    pub client_version: String,
    pub http_addr: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawConfig = envy::from_env()?;

        // §4.5 selection policy: an explicit unset falls back to
        // REDIS_ENABLED; an explicit value naming neither backend is
        // fatal (envy already rejects unknown variants at parse time).
        let ip_rate_limit_store = raw.ip_rate_limit_store.unwrap_or(if raw.redis_enabled {
            IpRateLimitStore::Redis
        } else {
            IpRateLimitStore::Lru
        });

        Ok(GatewayConfig {
            chain_id: raw.chain_id,
            rate_limit_disabled: raw.rate_limit_disabled,
            ip_rate_limit_store,
            redis_enabled: raw.redis_enabled,
            redis_url: raw.redis_url,
            redis_reconnect_delay: Duration::from_millis(raw.redis_reconnect_delay_ms),
            cache_ttl: Duration::from_millis(raw.cache_ttl),
            cache_max: raw.cache_max,
            ws_connection_limit: raw.ws_connection_limit,
            ws_connection_limit_per_ip: raw.ws_connection_limit_per_ip,
            ws_max_inactivity_ttl: Duration::from_millis(raw.ws_max_inactivity_ttl),
            ws_subscription_limit: raw.ws_subscription_limit,
            ws_polling_interval: Duration::from_millis(raw.ws_polling_interval),
            ws_new_heads_enabled: raw.ws_new_heads_enabled,
            ws_same_sub_for_same_event: raw.ws_same_sub_for_same_event,
            ws_cache_ttl: Duration::from_millis(raw.ws_cache_ttl),
            limit_duration: Duration::from_millis(raw.limit_duration),
            debug_api_enabled: raw.debug_api_enabled,
            subscriptions_enabled: raw.subscriptions_enabled,
            default_rate_limit: raw.default_rate_limit,
            archive_base_url: raw.archive_base_url,
            archive_timeout: Duration::from_millis(raw.archive_timeout_ms),
            archive_max_retries: raw.archive_max_retries,
            consensus_endpoint: raw.consensus_endpoint,
            client_version: raw
                .client_version
                .unwrap_or_else(|| format!("gateway/v{}", env!("CARGO_PKG_VERSION"))),
            http_addr: raw.http_addr,
        })
    }
}
