//! Result memoization keyed by a deterministic fingerprint of the call.
//!
//! The store itself has no notion of operations or skip rules; it is a
//! plain expiring map. [`CacheConfig`] — attached per operation in the
//! registry — tells the dispatcher when a given call is eligible to be
//! written back.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

/// `skipParams` / `skipNamedParams` entry: values are matched against the
/// positional argument at `arg_index`, pipe-delimited the way they arrive
/// from configuration.
pub struct SkipParam {
    pub arg_index: usize,
    pub values: Vec<String>,
}

pub struct SkipNamedParam {
    pub arg_index: usize,
    pub fields: Vec<(String, Vec<String>)>,
}

/// Per-operation cache behavior: how long a result lives, and which calls
/// must never be written back (non-cacheable block tags, mostly).
#[derive(Default)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub skip_params: Vec<SkipParam>,
    pub skip_named_params: Vec<SkipNamedParam>,
}

impl CacheConfig {
    pub fn new(ttl: Duration) -> Self {
        CacheConfig {
            ttl,
            skip_params: Vec::new(),
            skip_named_params: Vec::new(),
        }
    }

    pub fn skip_param(mut self, arg_index: usize, values: &[&str]) -> Self {
        self.skip_params.push(SkipParam {
            arg_index,
            values: values.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// A skip rule matches when the named argument is missing/undefined or
    /// equals one of the configured values — both cases mean "don't write".
    fn matches(&self, args: &[Value]) -> bool {
        for rule in &self.skip_params {
            match args.get(rule.arg_index) {
                None => return true,
                Some(value) => {
                    let as_str = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if rule.values.iter().any(|v| v == &as_str) {
                        return true;
                    }
                }
            }
        }
        for rule in &self.skip_named_params {
            let Some(Value::Object(map)) = args.get(rule.arg_index) else {
                continue;
            };
            for (name, values) in &rule.fields {
                if let Some(Value::String(actual)) = map.get(name) {
                    if values.iter().any(|v| v == actual) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Fingerprint built from the operation name followed by every positional
/// argument in order. Object arguments are flattened one level as
/// `_key_value` pairs; everything else is appended as `_value`. Two calls
/// with the same operation and non-context arguments always agree.
pub fn fingerprint(operation_name: &str, args: &[Value]) -> String {
    let mut key = operation_name.to_string();
    for arg in args {
        append_value(&mut key, arg);
    }
    key
}

fn append_value(key: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                key.push('_');
                key.push_str(k);
                key.push('_');
                key.push_str(&stringify(v));
            }
        }
        other => {
            key.push('_');
            key.push_str(&stringify(other));
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Process-lifetime, fingerprint-keyed memo. Bounded by `CACHE_MAX`;
/// eviction follows LRU order, same as the rate-limit store's backend.
pub struct CacheStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        CacheStore {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a live, unexpired entry if one exists. An expired entry is
    /// evicted on read rather than proactively swept.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Writes `value` unless `config` marks this call as non-cacheable.
    /// `undefined` results (there is no such JSON value, so callers simply
    /// never call this for them) are the only thing that skips a write
    /// besides an explicit skip rule.
    pub fn put(&self, key: String, value: Value, args: &[Value], config: &CacheConfig) {
        if config.matches(args) {
            return;
        }
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + config.ttl,
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_ignores_argument_order_sensitivity_only_when_equal() {
        let a = fingerprint("eth_getBalance", &[json!("0xabc"), json!("0x10")]);
        let b = fingerprint("eth_getBalance", &[json!("0xabc"), json!("0x10")]);
        let c = fingerprint("eth_getBalance", &[json!("0xabc"), json!("latest")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_flattens_objects_one_level() {
        let fp = fingerprint("eth_call", &[json!({"to": "0xabc", "data": "0x1"})]);
        assert!(fp.contains("to"));
        assert!(fp.contains("0xabc"));
    }

    #[test]
    fn skip_params_blocks_write_for_non_cacheable_block_tags() {
        let store = CacheStore::new(16);
        let config = CacheConfig::new(Duration::from_secs(60)).skip_param(
            1,
            &["latest", "pending", "safe", "finalized"],
        );
        let args = vec![json!("0xabc"), json!("latest")];
        let key = fingerprint("eth_getBalance", &args);
        store.put(key.clone(), json!("0x1"), &args, &config);
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn non_skip_calls_are_served_from_cache() {
        let store = CacheStore::new(16);
        let config = CacheConfig::new(Duration::from_secs(60));
        let args = vec![json!("0xabc"), json!("0x10")];
        let key = fingerprint("eth_getBalance", &args);
        store.put(key.clone(), json!("0x1"), &args, &config);
        assert_eq!(store.get(&key), Some(json!("0x1")));
    }

    #[test]
    fn expired_entries_are_treated_as_misses() {
        let store = CacheStore::new(16);
        let config = CacheConfig::new(Duration::from_millis(0));
        let args = vec![json!("0xabc")];
        let key = fingerprint("eth_chainId", &args);
        store.put(key.clone(), json!("0x1"), &args, &config);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get(&key).is_none());
    }
}
