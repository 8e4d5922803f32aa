//! WebSocket subscription runtime: a shared poller driving per-event
//! fan-out, with duplicate suppression and connection/IP/subscription
//! limits layered on top of the same dispatcher every HTTP call goes
//! through.

mod connection;
mod dedup;
mod poller;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use serde_json::{Value, json};
use tokio::sync::Mutex;

pub use connection::{AdmissionResult, Connection, ConnectionLimiter};
use dedup::DedupCache;
use poller::Poller;

use crate::errors::RpcErr;

pub type PollFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Vec<Value>> + Send>> + Send + Sync>;

fn random_subscription_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

/// Canonical fan-out key: the JSON of `{event, filters?}`. Two `Subscribe`
/// calls agree on a tag iff they'd see the exact same notifications.
fn event_tag(event: &str, filters: Option<&Value>) -> String {
    match filters {
        Some(filters) => json!({ "event": event, "filters": filters }).to_string(),
        None => json!({ "event": event }).to_string(),
    }
}

struct SubscriptionEntry {
    connection_id: String,
    #[allow(dead_code)]
    event_tag: String,
    #[allow(dead_code)]
    started_at: Instant,
}

pub struct SubscriptionRuntime {
    poller: Poller,
    dedup: DedupCache,
    same_sub_per_event: bool,
    subscription_limit: usize,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    tag_subscribers: Mutex<HashMap<String, HashSet<String>>>,
    subscriptions: Mutex<HashMap<String, SubscriptionEntry>>,
    connection_tag_index: Mutex<HashMap<(String, String), String>>,
}

impl SubscriptionRuntime {
    pub fn new(polling_interval: Duration, dedup_ttl: Duration, subscription_limit: usize, same_sub_per_event: bool) -> Self {
        SubscriptionRuntime {
            poller: Poller::new(polling_interval),
            dedup: DedupCache::new(10_000, dedup_ttl),
            same_sub_per_event,
            subscription_limit,
            connections: Mutex::new(HashMap::new()),
            tag_subscribers: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            connection_tag_index: Mutex::new(HashMap::new()),
        }
    }

    /// `make_poll_fn` is only invoked when this is the first subscriber for
    /// the resulting tag — redundant subscribers never build a second
    /// backend query closure or register a second poller callback.
    pub async fn subscribe(
        self: &Arc<Self>,
        connection: Arc<Connection>,
        event: &str,
        filters: Option<Value>,
        make_poll_fn: impl FnOnce() -> PollFn,
    ) -> Result<String, RpcErr> {
        if connection.subscriptions_count() >= self.subscription_limit {
            return Err(RpcErr::InvalidParam(
                "subscription limit exceeded for this connection".to_string(),
            ));
        }

        let tag = event_tag(event, filters.as_ref());

        if self.same_sub_per_event {
            let index = self.connection_tag_index.lock().await;
            if let Some(existing) = index.get(&(connection.id.clone(), tag.clone())) {
                return Ok(existing.clone());
            }
        }

        let subscription_id = random_subscription_id();

        let is_new_tag = {
            let mut subscribers = self.tag_subscribers.lock().await;
            let set = subscribers.entry(tag.clone()).or_default();
            let was_empty = set.is_empty();
            set.insert(subscription_id.clone());
            was_empty
        };

        self.subscriptions.lock().await.insert(
            subscription_id.clone(),
            SubscriptionEntry {
                connection_id: connection.id.clone(),
                event_tag: tag.clone(),
                started_at: Instant::now(),
            },
        );
        self.connection_tag_index
            .lock()
            .await
            .insert((connection.id.clone(), tag.clone()), subscription_id.clone());
        self.connections
            .lock()
            .await
            .insert(connection.id.clone(), connection.clone());
        connection.increment_subscriptions();

        if is_new_tag {
            let poll_fn = make_poll_fn();
            let runtime = self.clone();
            let tag_for_callback = tag.clone();
            let callback: poller::TagCallback = Arc::new(move || {
                let runtime = runtime.clone();
                let tag = tag_for_callback.clone();
                let poll_fn = poll_fn.clone();
                Box::pin(async move {
                    for result in poll_fn().await {
                        runtime.notify_subscribers(&tag, result).await;
                    }
                })
            });
            self.poller.add(tag, callback).await;
        }

        Ok(subscription_id)
    }

    /// Without `subscription_id`, removes every subscription belonging to
    /// `connection` and returns how many were removed.
    pub async fn unsubscribe(&self, connection: &Connection, subscription_id: Option<&str>) -> usize {
        let ids: Vec<String> = match subscription_id {
            Some(id) => {
                let subscriptions = self.subscriptions.lock().await;
                match subscriptions.get(id) {
                    Some(entry) if entry.connection_id == connection.id => vec![id.to_string()],
                    _ => vec![],
                }
            }
            None => {
                let subscriptions = self.subscriptions.lock().await;
                subscriptions
                    .iter()
                    .filter(|(_, entry)| entry.connection_id == connection.id)
                    .map(|(id, _)| id.clone())
                    .collect()
            }
        };

        for id in &ids {
            self.remove_one(connection, id).await;
        }
        ids.len()
    }

    async fn remove_one(&self, connection: &Connection, subscription_id: &str) {
        let tag = {
            let mut subscriptions = self.subscriptions.lock().await;
            subscriptions.remove(subscription_id).map(|e| e.event_tag)
        };
        let Some(tag) = tag else { return };

        self.connection_tag_index
            .lock()
            .await
            .remove(&(connection.id.clone(), tag.clone()));
        connection.decrement_subscriptions(1);

        let tag_now_empty = {
            let mut subscribers = self.tag_subscribers.lock().await;
            if let Some(set) = subscribers.get_mut(&tag) {
                set.remove(subscription_id);
                let empty = set.is_empty();
                if empty {
                    subscribers.remove(&tag);
                }
                empty
            } else {
                true
            }
        };
        if tag_now_empty {
            self.poller.remove(&tag).await;
        }
    }

    /// Sends one `eth_subscription` frame per live subscriber under `tag`,
    /// skipping any recipient who has already seen this exact result
    /// (content hash of `{result, subscription}`).
    async fn notify_subscribers(&self, tag: &str, result: Value) {
        let subscriber_ids: Vec<String> = {
            let subscribers = self.tag_subscribers.lock().await;
            subscribers
                .get(tag)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        };

        for subscription_id in subscriber_ids {
            let hash = DedupCache::content_hash(&subscription_id, &result);
            if !self.dedup.should_send(&hash) {
                continue;
            }
            let connection_id = {
                let subscriptions = self.subscriptions.lock().await;
                subscriptions
                    .get(&subscription_id)
                    .map(|e| e.connection_id.clone())
            };
            let Some(connection_id) = connection_id else {
                continue;
            };
            let connection = self.connections.lock().await.get(&connection_id).cloned();
            if let Some(connection) = connection {
                let frame = json!({
                    "jsonrpc": "2.0",
                    "method": "eth_subscription",
                    "params": {
                        "subscription": subscription_id,
                        "result": result,
                    }
                });
                connection.send(&frame.to_string());
            }
        }
    }

    pub async fn forget_connection(&self, connection: &Connection) {
        self.unsubscribe(connection, None).await;
        self.connections.lock().await.remove(&connection.id);
    }

    pub async fn poller_running(&self) -> bool {
        self.poller.is_running().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn connection() -> Arc<Connection> {
        let (tx, _rx) = unbounded_channel();
        Arc::new(Connection::new("127.0.0.1".to_string(), tx))
    }

    fn empty_poll_fn() -> PollFn {
        Arc::new(|| Box::pin(async { Vec::new() }))
    }

    #[tokio::test]
    async fn same_event_and_filters_reuse_subscription_id() {
        let runtime = Arc::new(SubscriptionRuntime::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            10,
            true,
        ));
        let conn = connection();
        let a = runtime
            .subscribe(conn.clone(), "logs", None, empty_poll_fn)
            .await
            .unwrap();
        let b = runtime
            .subscribe(conn.clone(), "logs", None, empty_poll_fn)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(conn.subscriptions_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_without_id_removes_everything() {
        let runtime = Arc::new(SubscriptionRuntime::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            10,
            false,
        ));
        let conn = connection();
        runtime
            .subscribe(conn.clone(), "logs", None, empty_poll_fn)
            .await
            .unwrap();
        runtime
            .subscribe(conn.clone(), "newHeads", None, empty_poll_fn)
            .await
            .unwrap();
        let removed = runtime.unsubscribe(&conn, None).await;
        assert_eq!(removed, 2);
        assert_eq!(conn.subscriptions_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_poll_result_is_sent_once() {
        let runtime = Arc::new(SubscriptionRuntime::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            10,
            false,
        ));
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let conn_a = Arc::new(Connection::new("1.1.1.1".to_string(), tx_a));
        let conn_b = Arc::new(Connection::new("1.1.1.2".to_string(), tx_b));

        runtime
            .subscribe(conn_a.clone(), "logs", None, empty_poll_fn)
            .await
            .unwrap();
        runtime
            .subscribe(conn_b.clone(), "logs", None, empty_poll_fn)
            .await
            .unwrap();

        let record = json!({"logIndex": "0x1"});
        runtime.notify_subscribers(&event_tag("logs", None), record.clone()).await;
        runtime.notify_subscribers(&event_tag("logs", None), record).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
