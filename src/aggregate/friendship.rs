//! Friendship Aggregate
//!
//! One directed row (member -> friend member). Two members are friends
//! only when both directions exist and are ACCEPTED; creating the mirror
//! row is the caller's responsibility.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent};

use super::{status_enum, Aggregate};

/// Friendship status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Unfriended,
}

status_enum!(FriendshipStatus, "friendship", {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
    Unfriended => "UNFRIENDED",
});

impl FriendshipStatus {
    /// PENDING and ACCEPTED rows block a new request for the same pair
    pub fn is_open(&self) -> bool {
        matches!(self, FriendshipStatus::Pending | FriendshipStatus::Accepted)
    }
}

/// Persisted shape of a friendship row
#[derive(Debug, Clone, PartialEq)]
pub struct FriendshipRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub friend_member_id: Uuid,
    pub status: FriendshipStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Friendship Aggregate
#[derive(Debug, Clone)]
pub struct Friendship {
    record: FriendshipRecord,
    events: Vec<DomainEvent>,
}

impl Friendship {
    /// Send a friend request from `from_id` to `to_id`
    pub fn request(id: Uuid, from_id: Uuid, to_id: Uuid) -> Result<Self, DomainError> {
        if from_id == to_id {
            return Err(DomainError::SelfRelation("befriend"));
        }

        let mut friendship = Self {
            record: FriendshipRecord {
                id,
                member_id: from_id,
                friend_member_id: to_id,
                status: FriendshipStatus::Pending,
                version: 0,
                created_at: Utc::now(),
            },
            events: Vec::new(),
        };
        friendship.events.push(DomainEvent::FriendRequestSent {
            friendship_id: id,
            from_id,
            to_id,
        });
        Ok(friendship)
    }

    /// Rebuild from database state
    pub fn from_record(record: FriendshipRecord) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// Accept a pending request; only the recipient may do so
    pub fn accept(&mut self, requester_id: Uuid) -> Result<(), DomainError> {
        self.ensure_recipient(requester_id)?;
        self.ensure_pending("accept")?;

        self.record.status = FriendshipStatus::Accepted;
        self.events.push(DomainEvent::FriendRequestAccepted {
            friendship_id: self.record.id,
            from_id: self.record.member_id,
            to_id: self.record.friend_member_id,
        });
        Ok(())
    }

    /// Reject a pending request; only the recipient may do so
    pub fn reject(&mut self, requester_id: Uuid) -> Result<(), DomainError> {
        self.ensure_recipient(requester_id)?;
        self.ensure_pending("reject")?;

        self.record.status = FriendshipStatus::Rejected;
        self.events.push(DomainEvent::FriendRequestRejected {
            friendship_id: self.record.id,
            from_id: self.record.member_id,
            to_id: self.record.friend_member_id,
        });
        Ok(())
    }

    /// End an accepted friendship; either party may do so
    pub fn unfriend(&mut self, requester_id: Uuid) -> Result<(), DomainError> {
        if requester_id != self.record.member_id && requester_id != self.record.friend_member_id {
            return Err(self.not_party(requester_id));
        }
        if self.record.status != FriendshipStatus::Accepted {
            return Err(DomainError::invalid_transition(
                "friendship",
                "unfriend",
                self.record.status,
            ));
        }

        self.record.status = FriendshipStatus::Unfriended;
        self.events.push(DomainEvent::FriendshipTerminated {
            member_id: self.record.member_id,
            friend_member_id: self.record.friend_member_id,
        });
        Ok(())
    }

    fn ensure_recipient(&self, requester_id: Uuid) -> Result<(), DomainError> {
        if requester_id != self.record.friend_member_id {
            return Err(self.not_party(requester_id));
        }
        Ok(())
    }

    fn not_party(&self, requester_id: Uuid) -> DomainError {
        DomainError::NotOwner {
            aggregate: "friendship",
            aggregate_id: self.record.id,
            member_id: requester_id,
        }
    }

    fn ensure_pending(&self, action: &'static str) -> Result<(), DomainError> {
        if self.record.status != FriendshipStatus::Pending {
            return Err(DomainError::invalid_transition(
                "friendship",
                action,
                self.record.status,
            ));
        }
        Ok(())
    }

    pub fn record(&self) -> &FriendshipRecord {
        &self.record
    }

    pub fn member_id(&self) -> Uuid {
        self.record.member_id
    }

    pub fn friend_member_id(&self) -> Uuid {
        self.record.friend_member_id
    }

    pub fn status(&self) -> FriendshipStatus {
        self.record.status
    }
}

impl Aggregate for Friendship {
    fn aggregate_type() -> &'static str {
        "Friendship"
    }

    fn id(&self) -> Uuid {
        self.record.id
    }

    fn version(&self) -> i64 {
        self.record.version
    }

    fn mark_persisted(&mut self, version: i64) {
        self.record.version = version;
    }

    fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Friendship {
        let mut friendship =
            Friendship::request(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).unwrap();
        friendship.take_events();
        friendship
    }

    #[test]
    fn test_request_to_self_fails() {
        let member = Uuid::new_v4();
        let result = Friendship::request(Uuid::new_v4(), member, member);
        assert_eq!(result.unwrap_err(), DomainError::SelfRelation("befriend"));
    }

    #[test]
    fn test_request_is_pending() {
        let from_id = Uuid::new_v4();
        let to_id = Uuid::new_v4();
        let mut friendship = Friendship::request(Uuid::new_v4(), from_id, to_id).unwrap();

        assert_eq!(friendship.status(), FriendshipStatus::Pending);
        assert_eq!(
            friendship.take_events(),
            vec![DomainEvent::FriendRequestSent {
                friendship_id: friendship.id(),
                from_id,
                to_id,
            }]
        );
    }

    #[test]
    fn test_accept_and_reject_only_from_pending() {
        let mut accepted = pending();
        let to_id = accepted.friend_member_id();
        accepted.accept(to_id).unwrap();
        assert_eq!(accepted.status(), FriendshipStatus::Accepted);
        assert!(accepted.accept(to_id).is_err());
        assert!(accepted.reject(to_id).is_err());

        let mut rejected = pending();
        let to_id = rejected.friend_member_id();
        rejected.reject(to_id).unwrap();
        assert_eq!(rejected.status(), FriendshipStatus::Rejected);
        assert!(rejected.accept(to_id).is_err());
    }

    #[test]
    fn test_only_recipient_can_accept() {
        let mut friendship = pending();
        let from_id = friendship.member_id();

        assert!(matches!(
            friendship.accept(from_id),
            Err(DomainError::NotOwner { .. })
        ));
        assert_eq!(friendship.status(), FriendshipStatus::Pending);
        assert!(friendship.take_events().is_empty());
    }

    #[test]
    fn test_unfriend_only_from_accepted() {
        let mut friendship = pending();
        let from_id = friendship.member_id();
        assert!(friendship.unfriend(from_id).is_err());

        friendship.accept(friendship.friend_member_id()).unwrap();
        friendship.take_events();
        assert!(friendship.unfriend(Uuid::new_v4()).is_err());
        friendship.unfriend(from_id).unwrap();

        assert_eq!(friendship.status(), FriendshipStatus::Unfriended);
        assert_eq!(
            friendship.take_events(),
            vec![DomainEvent::FriendshipTerminated {
                member_id: friendship.member_id(),
                friend_member_id: friendship.friend_member_id(),
            }]
        );
    }
}
