use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::RateLimitStore;

struct MethodCounter {
    remaining: u32,
    total: u32,
}

struct IpRecord {
    reset_at: Instant,
    methods: HashMap<String, MethodCounter>,
}

/// In-process backend: one record per IP, holding a per-method counter
/// that resets on a sliding window. Good enough for a single gateway
/// instance; [`super::RedisRateLimitStore`] is for a fleet.
pub struct LruRateLimitStore {
    duration: Duration,
    db: Mutex<HashMap<String, IpRecord>>,
}

impl LruRateLimitStore {
    pub fn new(duration: Duration) -> Self {
        LruRateLimitStore {
            duration,
            db: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl RateLimitStore for LruRateLimitStore {
    async fn increment_and_check(&self, ip: &str, method: &str, limit: u32) -> bool {
        let now = Instant::now();
        let mut db = self.db.lock().unwrap_or_else(|e| e.into_inner());

        let record = db.entry(ip.to_string()).or_insert_with(|| IpRecord {
            reset_at: now + self.duration,
            methods: HashMap::new(),
        });

        if now >= record.reset_at {
            record.reset_at = now + self.duration;
            for counter in record.methods.values_mut() {
                counter.remaining = counter.total;
            }
            let counter = record
                .methods
                .entry(method.to_string())
                .or_insert(MethodCounter {
                    remaining: limit,
                    total: limit,
                });
            counter.total = limit;
            counter.remaining = limit;
            counter.remaining = counter.remaining.saturating_sub(1);
            return false;
        }

        let counter = record
            .methods
            .entry(method.to_string())
            .or_insert(MethodCounter {
                remaining: limit,
                total: limit,
            });

        if counter.remaining > 0 {
            counter.remaining -= 1;
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sixth_call_in_five_limit_is_rejected() {
        let store = LruRateLimitStore::new(Duration::from_millis(50));
        for _ in 0..5 {
            assert!(!store.increment_and_check("1.2.3.4", "eth_call", 5).await);
        }
        assert!(store.increment_and_check("1.2.3.4", "eth_call", 5).await);
    }

    #[tokio::test]
    async fn resets_after_window_elapses() {
        let store = LruRateLimitStore::new(Duration::from_millis(20));
        for _ in 0..5 {
            store.increment_and_check("1.2.3.4", "eth_call", 5).await;
        }
        assert!(store.increment_and_check("1.2.3.4", "eth_call", 5).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.increment_and_check("1.2.3.4", "eth_call", 5).await);
    }

    #[tokio::test]
    async fn methods_are_tracked_independently_per_ip() {
        let store = LruRateLimitStore::new(Duration::from_secs(1));
        for _ in 0..5 {
            assert!(!store.increment_and_check("1.2.3.4", "eth_call", 5).await);
        }
        assert!(!store.increment_and_check("1.2.3.4", "eth_chainId", 5).await);
    }
}
