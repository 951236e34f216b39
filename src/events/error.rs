//! Handler Errors

use std::time::Duration;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Failure of one handler attempt
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The attempt exceeded the handler deadline
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HandlerError::Timeout(_))
    }
}
