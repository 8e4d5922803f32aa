//! Per-IP, per-method request quota with two interchangeable storage
//! backends. Both implement the same atomic increment-and-check contract
//! so the dispatcher never needs to know which one is active.

mod lru_store;
mod redis_store;

use std::time::Duration;

pub use lru_store::LruRateLimitStore;
pub use redis_store::RedisRateLimitStore;

/// Storage-agnostic contract: bump the counter for `key` and report
/// whether the caller is now over `limit`. Implementations fail open — an
/// infrastructure error must never deny a request.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn increment_and_check(&self, ip: &str, method: &str, limit: u32) -> bool;
}

pub fn key(ip: &str, method: &str) -> String {
    format!("ratelimit:{ip}:{method}")
}

#[derive(Clone, Copy)]
pub struct RateLimitWindow {
    pub duration: Duration,
}

impl Default for RateLimitWindow {
    fn default() -> Self {
        RateLimitWindow {
            duration: Duration::from_secs(1),
        }
    }
}

/// Per-method limit lookup with a fallback default, and the global
/// disable switch from `RATE_LIMIT_DISABLED`.
pub struct RateLimitConfig {
    pub disabled: bool,
    pub default_limit: u32,
    pub window: RateLimitWindow,
    pub overrides: std::collections::HashMap<String, u32>,
}

impl RateLimitConfig {
    pub fn limit_for(&self, method: &str) -> u32 {
        self.overrides
            .get(method)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// `eth_subscribe`/`eth_unsubscribe` are exempt by design; see the
    /// subscription runtime's connection limiter.
    pub fn is_exempt(method: &str) -> bool {
        matches!(method, "eth_subscribe" | "eth_unsubscribe")
    }
}
