use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type TagCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct TagEntry {
    callback: TagCallback,
    in_flight: Arc<AtomicBool>,
}

/// Process-wide singleton that ticks every active event tag on a fixed
/// interval. Starts automatically on the first [`Poller::add`] and stops
/// itself once the last tag is removed, so an idle gateway with no
/// subscribers spends nothing on polling.
pub struct Poller {
    interval: Duration,
    tags: Arc<Mutex<HashMap<String, TagEntry>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Poller {
            interval,
            tags: Arc::new(Mutex::new(HashMap::new())),
            task: Mutex::new(None),
        }
    }

    pub async fn add(&self, tag: String, callback: TagCallback) {
        {
            let mut tags = self.tags.lock().await;
            tags.insert(
                tag,
                TagEntry {
                    callback,
                    in_flight: Arc::new(AtomicBool::new(false)),
                },
            );
        }
        self.ensure_running().await;
    }

    pub async fn remove(&self, tag: &str) {
        let empty = {
            let mut tags = self.tags.lock().await;
            tags.remove(tag);
            tags.is_empty()
        };
        if empty {
            self.stop().await;
        }
    }

    async fn ensure_running(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }
        let tags = self.tags.clone();
        let interval = self.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot: Vec<(String, TagEntry)> = {
                    let tags = tags.lock().await;
                    tags.iter()
                        .map(|(tag, entry)| {
                            (
                                tag.clone(),
                                TagEntry {
                                    callback: entry.callback.clone(),
                                    in_flight: entry.in_flight.clone(),
                                },
                            )
                        })
                        .collect()
                };
                for (tag, entry) in snapshot {
                    // A tag's callback never overlaps itself: a slow
                    // backend query just gets skipped on the next tick.
                    if entry
                        .in_flight
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        debug!(%tag, "skipping tick, previous poll still running");
                        continue;
                    }
                    let callback = entry.callback.clone();
                    let in_flight = entry.in_flight.clone();
                    tokio::spawn(async move {
                        callback().await;
                        in_flight.store(false, Ordering::SeqCst);
                    });
                }
            }
        }));
    }

    async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        } else {
            warn!("poller stop requested with no task running");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }
}
