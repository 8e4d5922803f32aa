use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Bounded, TTL-expiring record of `(result, subscription)` hashes a
/// subscriber has already been sent. `eth_subscription` frames are
/// deduplicated per recipient so a poll tick that returns an unchanged
/// result doesn't resend it.
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<LruCache<String, Instant>>,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        DedupCache {
            ttl,
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn content_hash(subscription_id: &str, result: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(subscription_id.as_bytes());
        hasher.update(result.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns `true` the first time a given hash is seen (send it),
    /// `false` on every repeat within the TTL window (suppress it).
    pub fn should_send(&self, hash: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        match seen.get(hash) {
            Some(seen_at) if now.duration_since(*seen_at) < self.ttl => false,
            _ => {
                seen.put(hash.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_result_for_same_subscription_is_suppressed() {
        let cache = DedupCache::new(16, Duration::from_secs(60));
        let hash = DedupCache::content_hash("sub-1", &json!({"logIndex": "0x1"}));
        assert!(cache.should_send(&hash));
        assert!(!cache.should_send(&hash));
    }

    #[test]
    fn different_subscriptions_are_independent() {
        let cache = DedupCache::new(16, Duration::from_secs(60));
        let result = json!({"logIndex": "0x1"});
        let hash_a = DedupCache::content_hash("sub-a", &result);
        let hash_b = DedupCache::content_hash("sub-b", &result);
        assert!(cache.should_send(&hash_a));
        assert!(cache.should_send(&hash_b));
    }
}
