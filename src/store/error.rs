//! Store Errors
//!
//! Error types for persistence operations.

use uuid::Uuid;

use crate::aggregate::UnknownStatus;

/// Errors that can occur in the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// A unique constraint rejected the write
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Row to update does not exist
    #[error("{aggregate} not found: {id}")]
    NotFound { aggregate: &'static str, id: Uuid },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data could not be mapped back to a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error is a unique-constraint violation
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::Database(_)
        )
    }
}

impl From<UnknownStatus> for StoreError {
    fn from(err: UnknownStatus) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let conflict = StoreError::ConcurrencyConflict {
            aggregate_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_retryable());
        assert!(conflict.is_concurrency_conflict());

        let duplicate = StoreError::DuplicateKey("post_hearts".to_string());
        assert!(duplicate.is_duplicate());
        assert!(!duplicate.is_retryable());
    }

    #[test]
    fn test_unknown_status_maps_to_invalid_data() {
        let err: StoreError = UnknownStatus {
            kind: "follow",
            value: "PAUSED".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid stored data: Unknown follow status: PAUSED");
    }
}
