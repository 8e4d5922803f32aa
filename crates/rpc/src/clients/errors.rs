/// Failure taxonomy for the REST archival ("mirror") client. The dispatcher's
/// error normalizer matches on these to decide the outward JSON-RPC error.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream does not support this query")]
    NotSupported,
    #[error("not found")]
    NotFound,
    #[error("upstream returned {status}: {message}")]
    UpstreamFailure { status: u16, message: String },
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ArchiveError {
    pub fn status(&self) -> u16 {
        match self {
            ArchiveError::RateLimited => 429,
            ArchiveError::Timeout => 504,
            ArchiveError::NotSupported => 501,
            ArchiveError::NotFound => 404,
            ArchiveError::UpstreamFailure { status, .. } => *status,
            ArchiveError::Transport(_) => 502,
        }
    }
}

/// Failure taxonomy for the consensus-submission client. Timeouts and
/// dropped connections are distinguished because the dispatcher maps the
/// former to a "request timeout" error and everything else to "internal".
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("request to consensus node timed out")]
    Timeout,
    #[error("connection to consensus node dropped")]
    ConnectionDropped,
    #[error("consensus node rejected submission: {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
