use thiserror::Error;

/// Result alias for calls against the ledger.
pub type RpcResult<T> = Result<T, RpcError>;

/// Error variants of a call against the ledger node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The node did not answer in time.
    #[error("request timed out while awaiting response")]
    Timeout,
    /// The connection to the node failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The requested object does not exist on chain.
    #[error("not found: {0}")]
    NotFound(String),
    /// The node answered with something that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

// === impl RpcError ===

impl RpcError {
    /// Indicates whether this error is retryable or fatal.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::Transport("reset".into()).is_retryable());
        assert!(!RpcError::NotFound("request".into()).is_retryable());
        assert!(!RpcError::InvalidResponse("abi".into()).is_retryable());
    }
}
