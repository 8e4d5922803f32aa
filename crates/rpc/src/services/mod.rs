//! RPC-exposed operations, grouped one module per namespace. Each module
//! exposes an `operations()` builder that the binary wires into a
//! [`crate::registry::MethodRegistry`] at startup; nothing in here is
//! reachable except through that registry.

pub mod debug;
pub mod eth;
pub mod net;
pub mod web3;

use std::sync::Arc;

use serde_json::Value;

use crate::clients::{ArchiveClient, ConsensusClient};
use crate::errors::RpcErr;
use crate::registry::HandlerFn;

/// Passes every positional argument straight through to the archival
/// mirror as a `GET /rpc/{method}?params=<json>` call. The mirror's wire
/// format and the per-method query shape it expects are the opaque
/// collaborator contract, not this gateway's concern.
fn passthrough(archive: Arc<dyn ArchiveClient>, method: &'static str) -> HandlerFn {
    Arc::new(move |params, request| {
        let archive = archive.clone();
        Box::pin(async move {
            let path = archive_path(method, &params);
            archive.get(&path, &request).await.map_err(RpcErr::from)
        })
    })
}

fn archive_path(method: &str, params: &[Value]) -> String {
    let encoded = serde_json::to_string(params).unwrap_or_else(|_| "[]".to_string());
    format!("/rpc/{method}?params={}", percent_encode(&encoded))
}

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn constant(value: Value) -> HandlerFn {
    Arc::new(move |_params, _request| {
        let value = value.clone();
        Box::pin(async move { Ok(value) })
    })
}

/// A method the gateway deliberately refuses: it exists in the method
/// surface (so callers get "unsupported", not "not found"), but no
/// collaborator can ever answer it.
fn unsupported(name: &'static str) -> HandlerFn {
    Arc::new(move |_params, _request| {
        Box::pin(async move { Err(RpcErr::MethodUnsupported(name.to_string())) })
    })
}

fn send_raw_transaction(consensus: Arc<dyn ConsensusClient>) -> HandlerFn {
    Arc::new(move |params, request| {
        let consensus = consensus.clone();
        Box::pin(async move {
            let raw = params
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| RpcErr::MissingParam("0".to_string()))?;
            let bytes = hex::decode(raw.trim_start_matches("0x"))
                .map_err(|e| RpcErr::InvalidParam(format!("signed transaction is not valid hex: {e}")))?;
            let receipt = consensus.submit(&bytes, &request).await?;
            Ok(Value::String(receipt.transaction_id))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_encodes_params_as_json_query() {
        let path = archive_path("eth_getBalance", &[Value::String("0xabc".to_string())]);
        assert!(path.starts_with("/rpc/eth_getBalance?params="));
        assert!(!path.contains(' '));
    }
}
