use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::errors::RpcErrorMetadata;

/// One WebSocket client. Outbound sends go through `sender` so every
/// writer (the dispatcher replying to a call, the poller fanning out a
/// notification) serializes onto the same per-connection channel.
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub ip_address: String,
    sender: UnboundedSender<String>,
    subscriptions_count: AtomicUsize,
    ip_counted: AtomicBool,
    last_active: Mutex<Instant>,
}

impl Connection {
    pub fn new(ip_address: String, sender: UnboundedSender<String>) -> Self {
        Connection {
            id: Uuid::new_v4().to_string(),
            ip_address,
            sender,
            subscriptions_count: AtomicUsize::new(0),
            ip_counted: AtomicBool::new(false),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn send(&self, frame: &str) {
        let _ = self.sender.send(frame.to_string());
        self.touch();
    }

    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    pub fn subscriptions_count(&self) -> usize {
        self.subscriptions_count.load(Ordering::SeqCst)
    }

    pub fn increment_subscriptions(&self) {
        self.subscriptions_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_subscriptions(&self, by: usize) {
        self.subscriptions_count.fetch_sub(by, Ordering::SeqCst);
    }
}

fn pre_shaped_error(code: i32, message: &str) -> String {
    let frame = crate::errors::RpcErrorResponse::new(
        crate::rpc_types::RpcRequestId::None,
        RpcErrorMetadata {
            code,
            data: None,
            message: message.to_string(),
        },
    );
    serde_json::to_string(&frame).unwrap_or_default()
}

/// Enforces the global and per-IP ceilings on open WebSocket connections.
/// Both checks happen before a connection is admitted into the
/// subscription registry; a rejected connection is sent a pre-shaped
/// error frame and closed immediately.
pub struct ConnectionLimiter {
    global_limit: usize,
    per_ip_limit: usize,
    total: AtomicUsize,
    per_ip: Mutex<HashMap<String, usize>>,
}

pub enum AdmissionResult {
    Admitted,
    Rejected(String),
}

impl ConnectionLimiter {
    pub fn new(global_limit: usize, per_ip_limit: usize) -> Self {
        ConnectionLimiter {
            global_limit,
            per_ip_limit,
            total: AtomicUsize::new(0),
            per_ip: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_admit(&self, connection: &Connection) -> AdmissionResult {
        if self.total.load(Ordering::SeqCst) >= self.global_limit {
            return AdmissionResult::Rejected(pre_shaped_error(
                -32098,
                "Connection limit exceeded",
            ));
        }

        let mut per_ip = self.per_ip.lock().unwrap_or_else(|e| e.into_inner());
        let count = per_ip.entry(connection.ip_address.clone()).or_insert(0);
        if *count >= self.per_ip_limit {
            return AdmissionResult::Rejected(pre_shaped_error(
                -32099,
                "Per-IP connection limit exceeded",
            ));
        }

        *count += 1;
        connection.ip_counted.store(true, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        AdmissionResult::Admitted
    }

    pub fn release(&self, connection: &Connection) {
        if connection.ip_counted.swap(false, Ordering::SeqCst) {
            self.total.fetch_sub(1, Ordering::SeqCst);
            let mut per_ip = self.per_ip.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(count) = per_ip.get_mut(&connection.ip_address) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    per_ip.remove(&connection.ip_address);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(ip: &str) -> Connection {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Connection::new(ip.to_string(), tx)
    }

    #[test]
    fn per_ip_ceiling_rejects_beyond_limit() {
        let limiter = ConnectionLimiter::new(100, 1);
        let a = connection("1.2.3.4");
        let b = connection("1.2.3.4");
        assert!(matches!(limiter.try_admit(&a), AdmissionResult::Admitted));
        assert!(matches!(
            limiter.try_admit(&b),
            AdmissionResult::Rejected(_)
        ));
    }

    #[test]
    fn release_frees_the_slot() {
        let limiter = ConnectionLimiter::new(100, 1);
        let a = connection("1.2.3.4");
        limiter.try_admit(&a);
        limiter.release(&a);
        let b = connection("1.2.3.4");
        assert!(matches!(limiter.try_admit(&b), AdmissionResult::Admitted));
    }
}
