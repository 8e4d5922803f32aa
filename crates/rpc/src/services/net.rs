//! `net_*` namespace: two always-true-or-derived facts about the gateway's
//! connection to its backing ledger, neither of which needs a collaborator.

use serde_json::json;

use crate::registry::OperationSpec;

use super::constant;

pub fn operations(chain_id: u64) -> Vec<OperationSpec> {
    vec![
        OperationSpec::new("listening", constant(json!(true))),
        OperationSpec::new("version", constant(json!(chain_id.to_string()))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestDetails;
    use crate::registry::MethodRegistry;

    #[tokio::test]
    async fn version_reports_chain_id_as_decimal_string() {
        let registry = MethodRegistry::build(vec![("net", operations(298))]);
        let result = registry
            .get("net_version")
            .unwrap()
            .invoke(&[], RequestDetails::internal("r1"))
            .await
            .unwrap();
        assert_eq!(result, json!("298"));
    }
}
