use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RpcErr;

/// The `namespace` in `namespace_method`. Namespaces that the registry can
/// never populate (because the gateway deliberately does not implement that
/// layer) are still named here so the dispatcher can classify a miss.
pub enum RpcNamespace {
    Eth,
    Net,
    Web3,
    Debug,
    /// Deprecated execution/consensus-layer handshake methods.
    Engine,
    /// Other reserved namespaces the gateway does not serve at all.
    Reserved(String),
    Unknown(String),
}

impl RpcNamespace {
    pub fn classify(namespace: &str) -> Self {
        match namespace {
            "eth" => RpcNamespace::Eth,
            "net" => RpcNamespace::Net,
            "web3" => RpcNamespace::Web3,
            "debug" => RpcNamespace::Debug,
            "engine" => RpcNamespace::Engine,
            "trace" | "txpool" | "admin" | "personal" | "miner" => {
                RpcNamespace::Reserved(namespace.to_string())
            }
            other => RpcNamespace::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcRequestId {
    Number(u64),
    String(String),
    #[serde(skip_deserializing)]
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Vec<Value>>,
}

impl RpcRequest {
    /// `namespace_method` split on the first underscore; empty params default
    /// to an empty vec so callers never have to special-case `None`.
    pub fn namespace_and_method(&self) -> (&str, &str) {
        self.method
            .split_once('_')
            .unwrap_or((self.method.as_str(), ""))
    }

    pub fn namespace(&self) -> RpcNamespace {
        RpcNamespace::classify(self.namespace_and_method().0)
    }

    pub fn params(&self) -> &[Value] {
        self.params.as_deref().unwrap_or(&[])
    }
}

impl Default for RpcRequest {
    fn default() -> Self {
        RpcRequest {
            id: RpcRequestId::Number(1),
            jsonrpc: "2.0".to_string(),
            method: String::new(),
            params: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcSuccessResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub result: Value,
}

impl RpcSuccessResponse {
    pub fn new(id: RpcRequestId, result: Value) -> Self {
        RpcSuccessResponse {
            id,
            jsonrpc: "2.0".to_string(),
            result,
        }
    }
}

/// Incoming frame may be a single call or a JSON-RPC batch.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum RpcRequestWrapper {
    Single(RpcRequest),
    Batch(Vec<RpcRequest>),
}

pub fn method_not_found(method: &str) -> RpcErr {
    RpcErr::MethodNotFound(method.to_string())
}
