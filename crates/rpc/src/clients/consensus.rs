use serde_json::Value;

use crate::context::RequestDetails;

use super::errors::ConsensusError;

/// A submitted signed transaction plus the record returned once the
/// consensus node accepts it. Both sides are serialized JSON so the
/// gateway never needs to know the ledger's native transaction encoding.
pub struct SubmissionReceipt {
    pub transaction_id: String,
    pub record: Value,
}

/// The submission-facing network client used for write paths
/// (`eth_sendRawTransaction`). Errors distinguish timeouts and dropped
/// connections from outright rejection so the dispatcher can normalize
/// each case differently.
#[async_trait::async_trait]
pub trait ConsensusClient: Send + Sync {
    async fn submit(
        &self,
        signed_tx: &[u8],
        request: &RequestDetails,
    ) -> Result<SubmissionReceipt, ConsensusError>;
}

/// `reqwest`-backed implementation that posts the raw signed bytes to a
/// gRPC-to-HTTP gateway in front of the consensus-submission service.
pub struct GrpcConsensusClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GrpcConsensusClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        GrpcConsensusClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl ConsensusClient for GrpcConsensusClient {
    async fn submit(
        &self,
        signed_tx: &[u8],
        request: &RequestDetails,
    ) -> Result<SubmissionReceipt, ConsensusError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Request-Id", &request.request_id)
            .body(signed_tx.to_vec())
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ConsensusError::Timeout
                } else if error.is_connect() {
                    ConsensusError::ConnectionDropped
                } else {
                    ConsensusError::Transport(error)
                }
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_default();
            return Err(ConsensusError::Rejected { status, message });
        }
        let record: Value = response.json().await.map_err(ConsensusError::Transport)?;
        let transaction_id = record
            .get("transactionId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(SubmissionReceipt {
            transaction_id,
            record,
        })
    }
}
