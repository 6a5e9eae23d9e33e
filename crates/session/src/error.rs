use foundation::RequestId;
use runtime::CorrelationError;

use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport unavailable")]
    TransportUnavailable,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error("repeating query {id} is already running")]
    DuplicateSubscription { id: RequestId },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    /// The peer answered with something other than the expected value.
    pub fn is_unexpected_reply(&self) -> bool {
        matches!(
            self,
            Self::Correlation(CorrelationError::UnexpectedReply { .. })
        )
    }

    /// Failures a polling loop may recover from by trying again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportUnavailable | Self::Transport(_)) || self.is_unexpected_reply()
    }
}
