//! The single entry point from a transport (HTTP, WebSocket) into the
//! registry. Every call either returns a value or a fully normalized
//! JSON-RPC error frame; nothing escapes this function as a Rust panic or
//! an un-shaped error.

use serde_json::Value;

use crate::cache::{self, CacheConfig};
use crate::clients::{ArchiveError, ConsensusError};
use crate::context::RequestDetails;
use crate::errors::{RpcErr, RpcErrorMetadata, RpcErrorResponse};
use crate::ratelimit::{RateLimitConfig, RateLimitStore};
use crate::registry::MethodRegistry;
use crate::rpc_types::{RpcNamespace, RpcRequest, RpcSuccessResponse};
use crate::validator;

impl From<ArchiveError> for RpcErr {
    fn from(error: ArchiveError) -> Self {
        match error {
            ArchiveError::Timeout => RpcErr::RequestTimeout,
            other => RpcErr::Upstream {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ConsensusError> for RpcErr {
    fn from(error: ConsensusError) -> Self {
        match error {
            ConsensusError::Timeout => RpcErr::RequestTimeout,
            ConsensusError::ConnectionDropped => RpcErr::Internal("connection dropped".to_string()),
            ConsensusError::Rejected { status, message } => RpcErr::Upstream { status, message },
            ConsensusError::Transport(error) => RpcErr::Internal(error.to_string()),
        }
    }
}

/// Classifies a miss in the registry by namespace, per the admission rules:
/// deprecated consensus-handshake methods are "unsupported", other reserved
/// namespaces the gateway never serves are "not yet implemented", anything
/// else is a plain "method not found". `debug` is only reserved while the
/// feature is turned off — `services::debug::operations` registers nothing
/// in that case, so every `debug_*` call is a guaranteed miss here; with the
/// feature on, a miss means the method genuinely doesn't exist.
fn classify_miss(method: &str, namespace: RpcNamespace, debug_api_enabled: bool) -> RpcErr {
    match namespace {
        RpcNamespace::Engine => RpcErr::MethodUnsupported(method.to_string()),
        RpcNamespace::Reserved(_) => RpcErr::MethodNotYetImplemented(method.to_string()),
        RpcNamespace::Debug if !debug_api_enabled => {
            RpcErr::MethodNotYetImplemented(method.to_string())
        }
        _ => RpcErr::MethodNotFound(method.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_inner(
    registry: &MethodRegistry,
    cache: &cache::CacheStore,
    rate_limiter: &dyn RateLimitStore,
    rate_limit_config: &RateLimitConfig,
    debug_api_enabled: bool,
    request: &RpcRequest,
    details: &RequestDetails,
) -> Result<Value, RpcErr> {
    // ---- precheck: lookup + validate ----
    let operation = match registry.get(&request.method) {
        Some(operation) => operation,
        None => {
            return Err(classify_miss(
                &request.method,
                request.namespace(),
                debug_api_enabled,
            ));
        }
    };

    if let Some(schema) = operation.schema() {
        validator::validate_params(request.params(), schema)?;
    }

    // ---- cache: a hit bypasses rate-limit and the handler entirely ----
    let fingerprint = cache::fingerprint(&request.method, request.params());
    if let Some(hit) = cache.get(&fingerprint) {
        return Ok(hit);
    }

    // ---- rate-limit ----
    if !rate_limit_config.disabled && !RateLimitConfig::is_exempt(&request.method) {
        let limit = rate_limit_config.limit_for(&request.method);
        let limited = rate_limiter
            .increment_and_check(&details.ip_address, &request.method, limit)
            .await;
        if limited {
            return Err(RpcErr::RateLimitExceeded);
        }
    }

    // ---- process: invoke ----
    let result = operation.invoke(request.params(), details.clone()).await?;

    Ok(result)
}

/// Like [`dispatch`] but also writes the result back to `cache` under
/// `cache_config`, when one is configured for this method.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    registry: &MethodRegistry,
    cache: &cache::CacheStore,
    cache_configs: &std::collections::HashMap<String, CacheConfig>,
    rate_limiter: &dyn RateLimitStore,
    rate_limit_config: &RateLimitConfig,
    debug_api_enabled: bool,
    request: &RpcRequest,
    details: RequestDetails,
) -> Result<RpcSuccessResponse, RpcErrorResponse> {
    let outcome = dispatch_inner(
        registry,
        cache,
        rate_limiter,
        rate_limit_config,
        debug_api_enabled,
        request,
        &details,
    )
    .await;

    match outcome {
        Ok(value) => {
            if let Some(config) = cache_configs.get(&request.method) {
                let fingerprint = cache::fingerprint(&request.method, request.params());
                cache.put(fingerprint, value.clone(), request.params(), config);
            }
            Ok(RpcSuccessResponse::new(request.id.clone(), value))
        }
        Err(err) => {
            let mut metadata: RpcErrorMetadata = err.into();
            metadata.message = format!("{} {}", details.formatted_request_id(), metadata.message);
            Err(RpcErrorResponse::new(request.id.clone(), metadata))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::ratelimit::{LruRateLimitStore, RateLimitWindow};
    use crate::registry::{HandlerFn, MethodRegistry, OperationSpec};
    use crate::validator::{ParamRule, TypeTag, ValidationSchema};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn registry_with_chain_id() -> MethodRegistry {
        let handler: HandlerFn = Arc::new(|_args, _req| Box::pin(async { Ok(json!("0x12a")) }));
        MethodRegistry::build(vec![("eth", vec![OperationSpec::new("chainId", handler)])])
    }

    fn rate_limit_config() -> RateLimitConfig {
        RateLimitConfig {
            disabled: false,
            default_limit: 1000,
            window: RateLimitWindow::default(),
            overrides: Default::default(),
        }
    }

    #[tokio::test]
    async fn unknown_method_reports_method_name() {
        let registry = MethodRegistry::build(vec![]);
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "unknown_method".to_string(),
            ..Default::default()
        };
        let err = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            false,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap_err();
        assert!(err.error.message.contains("unknown_method"));
    }

    #[tokio::test]
    async fn engine_namespace_is_unsupported() {
        let registry = MethodRegistry::build(vec![]);
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "engine_newPayloadV1".to_string(),
            ..Default::default()
        };
        let err = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            false,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error.code, -32601);
    }

    #[tokio::test]
    async fn trace_namespace_is_not_yet_implemented() {
        let registry = MethodRegistry::build(vec![]);
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "trace_call".to_string(),
            ..Default::default()
        };
        let err = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            false,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap_err();
        assert!(err.error.message.contains("trace_call"));
    }

    #[tokio::test]
    async fn debug_namespace_is_not_yet_implemented_while_disabled() {
        let registry = MethodRegistry::build(vec![]);
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "debug_traceTransaction".to_string(),
            ..Default::default()
        };
        let err = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            false,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error.code, -32601);
        assert!(err.error.message.contains("debug_traceTransaction"));
    }

    #[tokio::test]
    async fn debug_namespace_is_method_not_found_when_enabled_and_missing() {
        let registry = MethodRegistry::build(vec![]);
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "debug_doesNotExist".to_string(),
            ..Default::default()
        };
        let err = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            true,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error.code, -32601);
        assert!(err.error.message.contains("not found"));
    }

    #[tokio::test]
    async fn chain_id_round_trips_without_validation() {
        let registry = registry_with_chain_id();
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "eth_chainId".to_string(),
            ..Default::default()
        };
        let response = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            false,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap();
        assert_eq!(response.result, json!("0x12a"));
    }

    #[tokio::test]
    async fn validation_failure_short_circuits_before_handler_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handler: HandlerFn = Arc::new(move |_args, _req| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("0x0"))
            })
        });
        let mut schema = ValidationSchema::new();
        schema.insert(0, ParamRule::required(TypeTag::Address));
        let registry = MethodRegistry::build(vec![(
            "eth",
            vec![OperationSpec::new("getBalance", handler).with_schema(schema)],
        )]);
        let cache = CacheStore::new(16);
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "eth_getBalance".to_string(),
            params: Some(vec![json!("not-an-address")]),
            ..Default::default()
        };
        let err = dispatch(
            &registry,
            &cache,
            &Default::default(),
            &rl,
            &rate_limit_config(),
            false,
            &request,
            RequestDetails::new("req-1", "127.0.0.1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error.code, -32602);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handler: HandlerFn = Arc::new(move |_args, _req| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("0x1"))
            })
        });
        let registry = MethodRegistry::build(vec![(
            "eth",
            vec![OperationSpec::new("getBalance", handler)],
        )]);
        let cache = CacheStore::new(16);
        let mut cache_configs = std::collections::HashMap::new();
        cache_configs.insert(
            "eth_getBalance".to_string(),
            CacheConfig::new(Duration::from_secs(60)),
        );
        let rl = LruRateLimitStore::new(Duration::from_secs(1));
        let request = RpcRequest {
            method: "eth_getBalance".to_string(),
            params: Some(vec![json!("0xabc"), json!("0x10")]),
            ..Default::default()
        };
        for _ in 0..2 {
            dispatch(
                &registry,
                &cache,
                &cache_configs,
                &rl,
                &rate_limit_config(),
                false,
                &request,
                RequestDetails::new("req-1", "127.0.0.1"),
            )
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
