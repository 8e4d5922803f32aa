//! `eth_*` namespace: accounts, blocks, calls, transactions, logs, filter
//! lifecycle, fees, and the subscription entry points.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::cache::CacheConfig;
use crate::clients::{ArchiveClient, ConsensusClient};
use crate::errors::RpcErr;
use crate::registry::{HandlerFn, OperationSpec};
use crate::subscriptions::SubscriptionRuntime;
use crate::validator::{ParamRule, TypeTag, ValidationSchema};

use super::{constant, passthrough, send_raw_transaction, unsupported};

fn schema(rules: Vec<(usize, ParamRule)>) -> ValidationSchema {
    ValidationSchema::from_iter(rules)
}

const NON_CACHEABLE_BLOCK_TAGS: [&str; 4] = ["latest", "pending", "safe", "finalized"];

fn subscribe(
    archive: Arc<dyn ArchiveClient>,
    subscriptions: Arc<SubscriptionRuntime>,
    ws_new_heads_enabled: bool,
) -> HandlerFn {
    Arc::new(move |params, request| {
        let archive = archive.clone();
        let subscriptions = subscriptions.clone();
        Box::pin(async move {
            let Some(connection) = request.ws_connection.clone() else {
                return Err(RpcErr::InvalidParam(
                    "eth_subscribe requires a WebSocket connection".to_string(),
                ));
            };
            let event = params
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| RpcErr::MissingParam("0".to_string()))?
                .to_string();
            if event == "newHeads" && !ws_new_heads_enabled {
                return Err(RpcErr::MethodUnsupported("eth_subscribe(newHeads)".to_string()));
            }
            let filters = params.get(1).cloned();

            let poll_archive = archive.clone();
            let poll_request = request.clone();
            let poll_event = event.clone();
            let poll_filters = filters.clone();
            let subscription_id = subscriptions
                .subscribe(connection, &event, filters, move || {
                    Arc::new(move || {
                        let archive = poll_archive.clone();
                        let request = poll_request.clone();
                        let path = archive_poll_path(&poll_event, poll_filters.as_ref());
                        Box::pin(async move {
                            match archive.get(&path, &request).await {
                                Ok(Value::Array(items)) => items,
                                Ok(Value::Null) => Vec::new(),
                                Ok(other) => vec![other],
                                Err(_) => Vec::new(),
                            }
                        })
                    })
                })
                .await?;
            Ok(json!(subscription_id))
        })
    })
}

fn archive_poll_path(event: &str, filters: Option<&Value>) -> String {
    let encoded = filters
        .map(|f| f.to_string())
        .unwrap_or_else(|| "null".to_string());
    format!("/rpc/eth_subscription/{event}?filters={}", super::percent_encode(&encoded))
}

fn unsubscribe(subscriptions: Arc<SubscriptionRuntime>) -> HandlerFn {
    Arc::new(move |params, request| {
        let subscriptions = subscriptions.clone();
        Box::pin(async move {
            let Some(connection) = request.ws_connection.clone() else {
                return Err(RpcErr::InvalidParam(
                    "eth_unsubscribe requires a WebSocket connection".to_string(),
                ));
            };
            let subscription_id = params.first().and_then(Value::as_str);
            let removed = subscriptions.unsubscribe(&connection, subscription_id).await;
            Ok(json!(removed > 0))
        })
    })
}

/// `(operations, cache_configs)`: handlers the dispatcher invokes, and the
/// per-method cache policy the binary feeds into `dispatch`. Most read
/// paths share the same skip rule — the trailing `blockParams` argument is
/// never cached when it names a tag that moves (`latest`, `pending`, ...).
#[allow(clippy::too_many_arguments)]
pub fn operations(
    archive: Arc<dyn ArchiveClient>,
    consensus: Arc<dyn ConsensusClient>,
    subscriptions: Arc<SubscriptionRuntime>,
    chain_id: u64,
    cache_ttl: Duration,
    subscriptions_enabled: bool,
    ws_new_heads_enabled: bool,
) -> (Vec<OperationSpec>, Vec<(&'static str, CacheConfig)>) {
    let block_param_cache = |arg_index: usize| {
        CacheConfig::new(cache_ttl).skip_param(arg_index, &NON_CACHEABLE_BLOCK_TAGS)
    };

    let mut ops = vec![
        OperationSpec::new("chainId", constant(json!(format!("0x{:x}", chain_id)))),
        OperationSpec::new("blockNumber", passthrough(archive.clone(), "eth_blockNumber")),
        OperationSpec::new("gasPrice", passthrough(archive.clone(), "eth_gasPrice")),
        OperationSpec::new("maxPriorityFeePerGas", constant(json!("0x0"))),
        OperationSpec::new("blobBaseFee", unsupported("eth_blobBaseFee")),
        OperationSpec::new("mining", constant(json!(false))),
        OperationSpec::new("syncing", constant(json!(false))),
        OperationSpec::new("hashrate", constant(json!("0x0"))),
        OperationSpec::new("accounts", constant(json!([]))),
        OperationSpec::new("coinbase", unsupported("eth_coinbase")),
        OperationSpec::new("protocolVersion", unsupported("eth_protocolVersion")),
        OperationSpec::new("sign", unsupported("eth_sign")),
        OperationSpec::new("signTransaction", unsupported("eth_signTransaction")),
        OperationSpec::new("sendTransaction", unsupported("eth_sendTransaction")),
        OperationSpec::new("submitHashrate", unsupported("eth_submitHashrate")),
        OperationSpec::new("getWork", unsupported("eth_getWork")),
        OperationSpec::new("getProof", unsupported("eth_getProof")),
        OperationSpec::new("createAccessList", unsupported("eth_createAccessList")),
        OperationSpec::new(
            "getUncleCountByBlockHash",
            constant(json!("0x0")),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::BlockHash))])),
        OperationSpec::new(
            "getUncleCountByBlockNumber",
            constant(json!("0x0")),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::BlockNumber))])),
        OperationSpec::new("getUncleByBlockHashAndIndex", constant(Value::Null)).with_schema(
            schema(vec![
                (0, ParamRule::required(TypeTag::BlockHash)),
                (1, ParamRule::required(TypeTag::Hex)),
            ]),
        ),
        OperationSpec::new("getUncleByBlockNumberAndIndex", constant(Value::Null)).with_schema(
            schema(vec![
                (0, ParamRule::required(TypeTag::BlockNumber)),
                (1, ParamRule::required(TypeTag::Hex)),
            ]),
        ),
        OperationSpec::new("getBalance", passthrough(archive.clone(), "eth_getBalance")).with_schema(
            schema(vec![
                (0, ParamRule::required(TypeTag::Address)),
                (1, ParamRule::required(TypeTag::BlockParams)),
            ]),
        ),
        OperationSpec::new(
            "getTransactionCount",
            passthrough(archive.clone(), "eth_getTransactionCount"),
        )
        .with_schema(schema(vec![
            (0, ParamRule::required(TypeTag::Address)),
            (1, ParamRule::required(TypeTag::BlockParams)),
        ])),
        OperationSpec::new("getCode", passthrough(archive.clone(), "eth_getCode")).with_schema(
            schema(vec![
                (0, ParamRule::required(TypeTag::Address)),
                (1, ParamRule::required(TypeTag::BlockParams)),
            ]),
        ),
        OperationSpec::new("getStorageAt", passthrough(archive.clone(), "eth_getStorageAt"))
            .with_schema(schema(vec![
                (0, ParamRule::required(TypeTag::Address)),
                (1, ParamRule::required(TypeTag::Hex64)),
                (2, ParamRule::required(TypeTag::BlockParams)),
            ])),
        OperationSpec::new(
            "getBlockByNumber",
            passthrough(archive.clone(), "eth_getBlockByNumber"),
        )
        .with_schema(schema(vec![
            (0, ParamRule::required(TypeTag::BlockNumber)),
            (1, ParamRule::required(TypeTag::Boolean)),
        ])),
        OperationSpec::new("getBlockByHash", passthrough(archive.clone(), "eth_getBlockByHash"))
            .with_schema(schema(vec![
                (0, ParamRule::required(TypeTag::BlockHash)),
                (1, ParamRule::required(TypeTag::Boolean)),
            ])),
        OperationSpec::new(
            "getBlockTransactionCountByNumber",
            passthrough(archive.clone(), "eth_getBlockTransactionCountByNumber"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::BlockNumber))])),
        OperationSpec::new(
            "getBlockTransactionCountByHash",
            passthrough(archive.clone(), "eth_getBlockTransactionCountByHash"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::BlockHash))])),
        OperationSpec::new(
            "getTransactionByHash",
            passthrough(archive.clone(), "eth_getTransactionByHash"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::TransactionHash))])),
        OperationSpec::new(
            "getTransactionByBlockHashAndIndex",
            passthrough(archive.clone(), "eth_getTransactionByBlockHashAndIndex"),
        )
        .with_schema(schema(vec![
            (0, ParamRule::required(TypeTag::BlockHash)),
            (1, ParamRule::required(TypeTag::Hex)),
        ])),
        OperationSpec::new(
            "getTransactionByBlockNumberAndIndex",
            passthrough(archive.clone(), "eth_getTransactionByBlockNumberAndIndex"),
        )
        .with_schema(schema(vec![
            (0, ParamRule::required(TypeTag::BlockNumber)),
            (1, ParamRule::required(TypeTag::Hex)),
        ])),
        OperationSpec::new(
            "getTransactionReceipt",
            passthrough(archive.clone(), "eth_getTransactionReceipt"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::TransactionHash))])),
        OperationSpec::new("getLogs", passthrough(archive.clone(), "eth_getLogs"))
            .with_schema(schema(vec![(0, ParamRule::required(TypeTag::Filter))])),
        OperationSpec::new("call", passthrough(archive.clone(), "eth_call")).with_schema(schema(
            vec![
                (0, ParamRule::required(TypeTag::Transaction)),
                (1, ParamRule::required(TypeTag::BlockParams)),
            ],
        )),
        OperationSpec::new("estimateGas", passthrough(archive.clone(), "eth_estimateGas"))
            .with_schema(schema(vec![(0, ParamRule::required(TypeTag::Transaction))])),
        OperationSpec::new("sendRawTransaction", send_raw_transaction(consensus.clone()))
            .with_schema(schema(vec![(0, ParamRule::required(TypeTag::HexEvenLength))])),
        OperationSpec::new("newFilter", passthrough(archive.clone(), "eth_newFilter"))
            .with_schema(schema(vec![(0, ParamRule::required(TypeTag::Filter))])),
        OperationSpec::new(
            "newBlockFilter",
            passthrough(archive.clone(), "eth_newBlockFilter"),
        ),
        OperationSpec::new(
            "newPendingTransactionFilter",
            passthrough(archive.clone(), "eth_newPendingTransactionFilter"),
        ),
        OperationSpec::new(
            "uninstallFilter",
            passthrough(archive.clone(), "eth_uninstallFilter"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::Hex))])),
        OperationSpec::new(
            "getFilterChanges",
            passthrough(archive.clone(), "eth_getFilterChanges"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::Hex))])),
        OperationSpec::new(
            "getFilterLogs",
            passthrough(archive.clone(), "eth_getFilterLogs"),
        )
        .with_schema(schema(vec![(0, ParamRule::required(TypeTag::Hex))])),
    ];

    if subscriptions_enabled {
        ops.push(OperationSpec::new(
            "subscribe",
            subscribe(archive.clone(), subscriptions.clone(), ws_new_heads_enabled),
        ));
        ops.push(OperationSpec::new("unsubscribe", unsubscribe(subscriptions)));
    }

    let cache_configs = vec![
        ("eth_getBalance", block_param_cache(1)),
        ("eth_getTransactionCount", block_param_cache(1)),
        ("eth_getCode", block_param_cache(1)),
        ("eth_getStorageAt", block_param_cache(2)),
        ("eth_call", block_param_cache(1)),
        ("eth_getBlockByNumber", block_param_cache(0)),
        ("eth_getTransactionByHash", CacheConfig::new(cache_ttl)),
        ("eth_getTransactionReceipt", CacheConfig::new(cache_ttl)),
        ("eth_getBlockByHash", CacheConfig::new(cache_ttl)),
    ];

    (ops, cache_configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::errors::{ArchiveError, ConsensusError};
    use crate::clients::consensus::SubmissionReceipt;
    use crate::context::RequestDetails;
    use crate::registry::MethodRegistry;

    struct StubArchive;

    #[async_trait::async_trait]
    impl ArchiveClient for StubArchive {
        async fn get(&self, _path: &str, _request: &RequestDetails) -> Result<Value, ArchiveError> {
            Ok(json!("0x1"))
        }
    }

    struct StubConsensus;

    #[async_trait::async_trait]
    impl ConsensusClient for StubConsensus {
        async fn submit(
            &self,
            _signed_tx: &[u8],
            _request: &RequestDetails,
        ) -> Result<SubmissionReceipt, ConsensusError> {
            Ok(SubmissionReceipt {
                transaction_id: "0xdead".to_string(),
                record: json!({}),
            })
        }
    }

    fn test_registry() -> MethodRegistry {
        test_registry_with(true, true)
    }

    fn test_registry_with(subscriptions_enabled: bool, ws_new_heads_enabled: bool) -> MethodRegistry {
        let runtime = Arc::new(SubscriptionRuntime::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            10,
            true,
        ));
        let (ops, _cache) = operations(
            Arc::new(StubArchive),
            Arc::new(StubConsensus),
            runtime,
            298,
            Duration::from_secs(1),
            subscriptions_enabled,
            ws_new_heads_enabled,
        );
        MethodRegistry::build(vec![("eth", ops)])
    }

    #[tokio::test]
    async fn chain_id_is_formatted_as_hex() {
        let registry = test_registry();
        let result = registry
            .get("eth_chainId")
            .unwrap()
            .invoke(&[], RequestDetails::internal("r1"))
            .await
            .unwrap();
        assert_eq!(result, json!("0x12a"));
    }

    #[tokio::test]
    async fn unsupported_stub_reports_unsupported() {
        let registry = test_registry();
        let err = registry
            .get("eth_sign")
            .unwrap()
            .invoke(&[], RequestDetails::internal("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcErr::MethodUnsupported(method) if method == "eth_sign"));
    }

    #[tokio::test]
    async fn deliberate_constants_are_served_as_literals() {
        let registry = test_registry();
        for (method, expected) in [
            ("eth_mining", json!(false)),
            ("eth_syncing", json!(false)),
            ("eth_hashrate", json!("0x0")),
            ("eth_maxPriorityFeePerGas", json!("0x0")),
            ("eth_accounts", json!([])),
        ] {
            let result = registry
                .get(method)
                .unwrap()
                .invoke(&[], RequestDetails::internal("r1"))
                .await
                .unwrap();
            assert_eq!(result, expected, "{method}");
        }
    }

    #[tokio::test]
    async fn send_raw_transaction_returns_submitted_id() {
        let registry = test_registry();
        let result = registry
            .get("eth_sendRawTransaction")
            .unwrap()
            .invoke(&[json!("0xdeadbeef")], RequestDetails::internal("r1"))
            .await
            .unwrap();
        assert_eq!(result, json!("0xdead"));
    }

    #[test]
    fn subscriptions_disabled_drops_subscribe_and_unsubscribe() {
        let registry = test_registry_with(false, true);
        assert!(registry.get("eth_subscribe").is_none());
        assert!(registry.get("eth_unsubscribe").is_none());
    }

    #[tokio::test]
    async fn new_heads_subscription_is_rejected_while_disabled() {
        let registry = test_registry_with(true, false);
        let connection = Arc::new(crate::subscriptions::Connection::new(
            "127.0.0.1".to_string(),
            tokio::sync::mpsc::unbounded_channel().0,
        ));
        let details = RequestDetails::internal("r1").with_connection(connection);
        let err = registry
            .get("eth_subscribe")
            .unwrap()
            .invoke(&[json!("newHeads")], details)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcErr::MethodUnsupported(_)));
    }
}
