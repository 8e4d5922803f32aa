use std::time::Duration;

use serde_json::Value;

use crate::context::RequestDetails;

use super::errors::ArchiveError;

/// The REST-facing indexer used for every read path (`eth_getBalance`,
/// `eth_getLogs`, transaction/receipt/block lookups, ...). Concrete
/// translation of each method's query shape is out of scope here; the
/// trait only captures the one operation every handler needs.
#[async_trait::async_trait]
pub trait ArchiveClient: Send + Sync {
    async fn get(&self, path: &str, request: &RequestDetails) -> Result<Value, ArchiveError>;
}

/// Thin `reqwest`-backed implementation. Retries are limited to transient
/// transport failures; a non-2xx response is translated straight into the
/// matching [`ArchiveError`] variant rather than retried blindly.
pub struct HttpArchiveClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl HttpArchiveClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        HttpArchiveClient {
            client,
            base_url: base_url.into(),
            max_retries,
        }
    }
}

#[async_trait::async_trait]
impl ArchiveClient for HttpArchiveClient {
    async fn get(&self, path: &str, request: &RequestDetails) -> Result<Value, ArchiveError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .get(&url)
                .header("X-Request-Id", &request.request_id)
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status().as_u16();
                    return match status {
                        200..=299 => response.json::<Value>().await.map_err(ArchiveError::from),
                        429 => Err(ArchiveError::RateLimited),
                        404 => Err(ArchiveError::NotFound),
                        501 => Err(ArchiveError::NotSupported),
                        _ => {
                            let message = response.text().await.unwrap_or_default();
                            Err(ArchiveError::UpstreamFailure { status, message })
                        }
                    };
                }
                Err(error) if error.is_timeout() => {
                    if attempt >= self.max_retries {
                        return Err(ArchiveError::Timeout);
                    }
                    attempt += 1;
                }
                Err(error) => {
                    if attempt >= self.max_retries {
                        return Err(ArchiveError::Transport(error));
                    }
                    attempt += 1;
                }
            }
        }
    }
}
