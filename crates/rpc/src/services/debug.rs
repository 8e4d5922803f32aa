//! `debug_*` namespace. Only trace-transaction and trace-block are
//! registered; every other `debug_*` call falls through the registry miss
//! and is classified "not yet implemented" by the dispatcher, same as the
//! `trace_*` namespace.

use std::sync::Arc;

use crate::clients::ArchiveClient;
use crate::registry::OperationSpec;
use crate::validator::{ParamRule, TypeTag, ValidationSchema};

use super::passthrough;

fn schema(rules: Vec<(usize, ParamRule)>) -> ValidationSchema {
    ValidationSchema::from_iter(rules)
}

pub fn operations(archive: Arc<dyn ArchiveClient>, enabled: bool) -> Vec<OperationSpec> {
    if !enabled {
        return Vec::new();
    }
    vec![
        OperationSpec::new(
            "traceTransaction",
            passthrough(archive.clone(), "debug_traceTransaction"),
        )
        .with_schema(schema(vec![
            (0, ParamRule::required(TypeTag::TransactionHash)),
            (1, ParamRule::optional(TypeTag::TracerConfigWrapper)),
        ])),
        OperationSpec::new("traceBlock", passthrough(archive, "debug_traceBlockByNumber"))
            .with_schema(schema(vec![
                (0, ParamRule::required(TypeTag::BlockNumberOrHash)),
                (1, ParamRule::optional(TypeTag::TracerConfigWrapper)),
            ])),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::errors::ArchiveError;
    use crate::context::RequestDetails;
    use crate::registry::MethodRegistry;
    use serde_json::{Value, json};

    struct StubArchive;

    #[async_trait::async_trait]
    impl ArchiveClient for StubArchive {
        async fn get(&self, _path: &str, _request: &RequestDetails) -> Result<Value, ArchiveError> {
            Ok(json!({"gas": "0x5208"}))
        }
    }

    #[test]
    fn disabled_flag_yields_no_operations() {
        assert!(operations(Arc::new(StubArchive), false).is_empty());
    }

    #[tokio::test]
    async fn trace_transaction_passes_through_to_archive() {
        let registry =
            MethodRegistry::build(vec![("debug", operations(Arc::new(StubArchive), true))]);
        let tx_hash = format!("0x{}", "a".repeat(64));
        let result = registry
            .get("debug_traceTransaction")
            .unwrap()
            .invoke(&[json!(tx_hash)], RequestDetails::internal("r1"))
            .await
            .unwrap();
        assert_eq!(result, json!({"gas": "0x5208"}));
    }
}
