//! `web3_*` namespace: a single static identification string.

use serde_json::json;

use crate::registry::OperationSpec;

use super::constant;

pub fn operations(client_version: &str) -> Vec<OperationSpec> {
    vec![OperationSpec::new(
        "clientVersion",
        constant(json!(client_version)),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestDetails;
    use crate::registry::MethodRegistry;

    #[tokio::test]
    async fn client_version_echoes_configured_string() {
        let registry = MethodRegistry::build(vec![("web3", operations("gateway/v0.1.0"))]);
        let result = registry
            .get("web3_clientVersion")
            .unwrap()
            .invoke(&[], RequestDetails::internal("r1"))
            .await
            .unwrap();
        assert_eq!(result, json!("gateway/v0.1.0"));
    }
}
