//! Follow Aggregate
//!
//! One row per (follower, following) pair. Re-following reactivates the
//! existing row instead of inserting a second one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent};

use super::{status_enum, Aggregate};

/// Follow status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowStatus {
    Active,
    Unfollowed,
    Blocked,
}

status_enum!(FollowStatus, "follow", {
    Active => "ACTIVE",
    Unfollowed => "UNFOLLOWED",
    Blocked => "BLOCKED",
});

/// Persisted shape of a follow row
#[derive(Debug, Clone, PartialEq)]
pub struct FollowRecord {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub following_id: Uuid,
    pub status: FollowStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Follow Aggregate
#[derive(Debug, Clone)]
pub struct Follow {
    record: FollowRecord,
    events: Vec<DomainEvent>,
}

impl Follow {
    /// Start following; the relationship begins ACTIVE
    pub fn create(id: Uuid, follower_id: Uuid, following_id: Uuid) -> Result<Self, DomainError> {
        let mut follow = Self::new_row(id, follower_id, following_id, FollowStatus::Active)?;
        follow.events.push(follow.started());
        Ok(follow)
    }

    /// Create a relationship that is blocked from the start
    pub fn create_blocked(
        id: Uuid,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Self, DomainError> {
        let mut follow = Self::new_row(id, follower_id, following_id, FollowStatus::Blocked)?;
        follow.events.push(DomainEvent::FollowBlocked {
            follow_id: id,
            follower_id,
            following_id,
        });
        Ok(follow)
    }

    fn new_row(
        id: Uuid,
        follower_id: Uuid,
        following_id: Uuid,
        status: FollowStatus,
    ) -> Result<Self, DomainError> {
        if follower_id == following_id {
            return Err(DomainError::SelfRelation("follow"));
        }

        Ok(Self {
            record: FollowRecord {
                id,
                follower_id,
                following_id,
                status,
                version: 0,
                created_at: Utc::now(),
            },
            events: Vec::new(),
        })
    }

    /// Rebuild from database state
    pub fn from_record(record: FollowRecord) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// Stop following; legal only from ACTIVE
    pub fn unfollow(&mut self) -> Result<(), DomainError> {
        if self.record.status != FollowStatus::Active {
            return Err(DomainError::invalid_transition(
                "follow",
                "unfollow",
                self.record.status,
            ));
        }

        self.record.status = FollowStatus::Unfollowed;
        self.events.push(DomainEvent::Unfollowed {
            follow_id: self.record.id,
            follower_id: self.record.follower_id,
            following_id: self.record.following_id,
        });
        Ok(())
    }

    /// Follow again; legal only from a non-ACTIVE status
    pub fn reactivate(&mut self) -> Result<(), DomainError> {
        if self.record.status == FollowStatus::Active {
            return Err(DomainError::AlreadyActive("follow"));
        }

        self.record.status = FollowStatus::Active;
        self.events.push(self.started());
        Ok(())
    }

    /// Block the relationship; legal from any status
    pub fn block(&mut self) -> Result<(), DomainError> {
        self.record.status = FollowStatus::Blocked;
        self.events.push(DomainEvent::FollowBlocked {
            follow_id: self.record.id,
            follower_id: self.record.follower_id,
            following_id: self.record.following_id,
        });
        Ok(())
    }

    fn started(&self) -> DomainEvent {
        DomainEvent::FollowStarted {
            follow_id: self.record.id,
            follower_id: self.record.follower_id,
            following_id: self.record.following_id,
        }
    }

    pub fn record(&self) -> &FollowRecord {
        &self.record
    }

    pub fn follower_id(&self) -> Uuid {
        self.record.follower_id
    }

    pub fn following_id(&self) -> Uuid {
        self.record.following_id
    }

    pub fn status(&self) -> FollowStatus {
        self.record.status
    }
}

impl Aggregate for Follow {
    fn aggregate_type() -> &'static str {
        "Follow"
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
