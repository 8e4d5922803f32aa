use serde::{Deserialize, Serialize};

use crate::rpc_types::RpcRequestId;

/// Every failure that can surface out of the dispatcher.
///
/// Variants map 1:1 onto the taxonomy in the gateway design: validation and
/// method-admission errors are raised before a handler ever runs, upstream
/// errors are produced by the archival/consensus collaborators, and
/// `Internal` is the catch-all for anything unexpected.
#[derive(Debug)]
pub enum RpcErr {
    MethodNotFound(String),
    MethodUnsupported(String),
    MethodNotYetImplemented(String),
    TooManyParams,
    MissingParam(String),
    InvalidParam(String),
    UnknownParam(String),
    UnknownBlock(String),
    RateLimitExceeded,
    TransactionSizeExceeded,
    RequestTimeout,
    Upstream { status: u16, message: String },
    Internal(String),
}

/// Wire-shaped JSON-RPC error object, `{code, message, data?}`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcErrorMetadata {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub message: String,
}

impl From<RpcErr> for RpcErrorMetadata {
    fn from(value: RpcErr) -> Self {
        match value {
            RpcErr::MethodNotFound(method) => RpcErrorMetadata {
                code: -32601,
                data: None,
                message: format!("Method {method} not found"),
            },
            RpcErr::MethodUnsupported(method) => RpcErrorMetadata {
                code: -32601,
                data: None,
                message: format!("Method {method} is unsupported"),
            },
            RpcErr::MethodNotYetImplemented(method) => RpcErrorMetadata {
                code: -32601,
                data: None,
                message: format!("Method {method} is not supported"),
            },
            RpcErr::TooManyParams => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: "Invalid params: too many parameters".to_string(),
            },
            RpcErr::MissingParam(index) => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("Missing value for required parameter {index}"),
            },
            RpcErr::InvalidParam(context) => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("Invalid parameter: {context}"),
            },
            RpcErr::UnknownParam(name) => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("Unknown parameter {name}"),
            },
            RpcErr::UnknownBlock(context) => RpcErrorMetadata {
                code: -32001,
                data: None,
                message: format!("Unknown block: {context}"),
            },
            RpcErr::RateLimitExceeded => RpcErrorMetadata {
                code: -32029,
                data: None,
                message: "Rate limit exceeded".to_string(),
            },
            RpcErr::TransactionSizeExceeded => RpcErrorMetadata {
                code: -32030,
                data: None,
                message: "Transaction size exceeded".to_string(),
            },
            RpcErr::RequestTimeout => RpcErrorMetadata {
                code: -32008,
                data: None,
                message: "Request timeout".to_string(),
            },
            RpcErr::Upstream { status, message } => RpcErrorMetadata {
                code: -32020,
                data: Some(status.to_string()),
                message,
            },
            RpcErr::Internal(context) => RpcErrorMetadata {
                code: -32603,
                data: None,
                message: format!("Internal error: {context}"),
            },
        }
    }
}

impl From<serde_json::Error> for RpcErr {
    fn from(error: serde_json::Error) -> Self {
        RpcErr::InvalidParam(error.to_string())
    }
}

/// Final error frame sent to the client: the normalized metadata plus the
/// echoed request id, built once by the dispatcher right before it returns.
#[derive(Serialize, Deserialize, Debug)]
pub struct RpcErrorResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub error: RpcErrorMetadata,
}

impl RpcErrorResponse {
    pub fn new(id: RpcRequestId, error: RpcErrorMetadata) -> Self {
        RpcErrorResponse {
            id,
            jsonrpc: "2.0".to_string(),
            error,
        }
    }
}
