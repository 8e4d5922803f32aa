use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CacheConfig, CacheStore};
use crate::clients::{ArchiveClient, ConsensusClient};
use crate::config::GatewayConfig;
use crate::ratelimit::{RateLimitConfig, RateLimitStore};
use crate::registry::MethodRegistry;
use crate::subscriptions::{Connection, ConnectionLimiter, SubscriptionRuntime};

/// Carried through every call: the dispatcher builds one per inbound
/// request and hands it to the handler and to the archival client alike.
/// Immutable once created; it never outlives the request it describes.
///
/// `ws_connection` is only set for calls arriving over a WebSocket; it is
/// how `eth_subscribe`/`eth_unsubscribe` reach the connection they're
/// operating on without widening the handler signature every other
/// operation has to live with.
#[derive(Debug, Clone)]
pub struct RequestDetails {
    pub request_id: String,
    pub ip_address: String,
    pub ws_connection: Option<Arc<Connection>>,
    formatted_request_id: String,
}

impl RequestDetails {
    pub fn new(request_id: impl Into<String>, ip_address: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let formatted_request_id = format!("[Request ID: {request_id}]");
        RequestDetails {
            request_id,
            ip_address: ip_address.into(),
            ws_connection: None,
            formatted_request_id,
        }
    }

    /// Constructs a context value for server-internal calls (the filter
    /// clean-up task, the poller's background queries) that never had an
    /// inbound IP to record.
    pub fn internal(request_id: impl Into<String>) -> Self {
        RequestDetails::new(request_id, "")
    }

    pub fn with_connection(mut self, connection: Arc<Connection>) -> Self {
        self.ws_connection = Some(connection);
        self
    }

    pub fn formatted_request_id(&self) -> &str {
        &self.formatted_request_id
    }
}

/// Process-lifetime state shared across every connection and request.
/// Everything here is either read-only after startup (the registry) or
/// internally synchronized (the cache, the rate-limit store).
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<MethodRegistry>,
    pub cache: Arc<CacheStore>,
    pub cache_configs: Arc<HashMap<String, CacheConfig>>,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub rate_limit_config: Arc<RateLimitConfig>,
    pub connection_limiter: Arc<ConnectionLimiter>,
    pub subscriptions: Arc<SubscriptionRuntime>,
    pub archive: Arc<dyn ArchiveClient>,
    pub consensus: Arc<dyn ConsensusClient>,
}
