use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::warn;

use super::RateLimitStore;

/// `INCR` the key; on the first hit of a window, `EXPIRE` it; return
/// whether the new count exceeds `limit`. Must run as a single atomic
/// script so concurrent gateway instances never race each other.
const INCR_AND_CHECK: &str = r#"
local n = redis.call("INCR", KEYS[1])
if n == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
if n > tonumber(ARGV[2]) then
    return 1
else
    return 0
end
"#;

/// Shared-storage backend for a fleet of gateway instances. Failures
/// (connectivity, script error, a non-numeric reply) are fail-open: the
/// call is treated as not-limited and counted in `failures`.
pub struct RedisRateLimitStore {
    manager: ConnectionManager,
    script: Script,
    window: Duration,
    failures: AtomicU64,
}

impl RedisRateLimitStore {
    pub async fn connect(url: &str, reconnect_delay: Duration, window: Duration) -> Result<Self, redis::RedisError> {
        let client = Client::open(url)?;
        let config = redis::aio::ConnectionManagerConfig::new()
            .set_exponent_base(2)
            .set_factor(reconnect_delay.as_millis().max(1) as u64)
            .set_number_of_retries(usize::MAX);
        let manager = client.get_connection_manager_with_config(config).await?;
        Ok(RedisRateLimitStore {
            manager,
            script: Script::new(INCR_AND_CHECK),
            window,
            failures: AtomicU64::new(0),
        })
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment_and_check(&self, ip: &str, method: &str, limit: u32) -> bool {
        let key = super::key(ip, method);
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<i64> = self
            .script
            .key(key)
            .arg(self.window.as_secs().max(1))
            .arg(limit)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(1) => true,
            Ok(_) => false,
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%error, "rate limit store failed, failing open");
                false
            }
        }
    }
}
