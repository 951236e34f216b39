//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;
use uuid::Uuid;

/// Validation failures raised synchronously by aggregate transitions.
///
/// A transition that fails with one of these never records an event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A relationship whose two ends are the same member
    #[error("Cannot {0} yourself")]
    SelfRelation(&'static str),

    /// The aggregate's current status does not allow the action
    #[error("Cannot {action} {aggregate} in status {status}")]
    InvalidTransition {
        aggregate: &'static str,
        action: &'static str,
        status: String,
    },

    /// Reactivation of something that is already active
    #[error("{0} is already active")]
    AlreadyActive(&'static str),

    /// The acting member is not allowed to change this aggregate
    #[error("Member {member_id} is not allowed to modify {aggregate} {aggregate_id}")]
    NotOwner {
        aggregate: &'static str,
        aggregate_id: Uuid,
        member_id: Uuid,
    },

    /// The aggregate has been soft-deleted
    #[error("{aggregate} {id} has been deleted")]
    Deleted { aggregate: &'static str, id: Uuid },

    /// Referenced aggregate does not exist
    #[error("{aggregate} not found: {id}")]
    NotFound { aggregate: &'static str, id: Uuid },

    /// The relationship or record already exists
    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    /// Malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DomainError {
    pub fn invalid_transition(
        aggregate: &'static str,
        action: &'static str,
        status: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            aggregate,
            action,
            status: status.to_string(),
        }
    }

    pub fn not_found(aggregate: &'static str, id: Uuid) -> Self {
        Self::NotFound { aggregate, id }
    }

    /// Check if this is a permission failure
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::NotOwner { .. })
    }

    /// Check if this is a conflict with existing state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyActive(_) | Self::AlreadyExists(_) | Self::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_relation_message() {
        let err = DomainError::SelfRelation("follow");
        assert_eq!(err.to_string(), "Cannot follow yourself");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = DomainError::invalid_transition("friendship", "accept", "ACCEPTED");
        assert_eq!(err.to_string(), "Cannot accept friendship in status ACCEPTED");
        assert!(err.is_conflict());
        assert!(!err.is_forbidden());
    }

    #[test]
    fn test_not_owner_is_forbidden() {
        let err = DomainError::NotOwner {
            aggregate: "post",
            aggregate_id: Uuid::nil(),
            member_id: Uuid::nil(),
        };
        assert!(err.is_forbidden());
    }
}
