//! Collection Aggregate
//!
//! A member's named list of saved posts.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent};

use super::{status_enum, Aggregate, Post};

/// Collection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Active,
    Deleted,
}

status_enum!(CollectionStatus, "collection", {
    Active => "ACTIVE",
    Deleted => "DELETED",
});

/// Persisted shape of a collection and its post membership
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: CollectionStatus,
    pub post_ids: BTreeSet<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Collection Aggregate
#[derive(Debug, Clone)]
pub struct Collection {
    record: CollectionRecord,
    events: Vec<DomainEvent>,
}

impl Collection {
    pub fn create(id: Uuid, owner_id: Uuid, name: String) -> Result<Self, DomainError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::InvalidInput("Collection name is required".to_string()));
        }

        let mut collection = Self {
            record: CollectionRecord {
                id,
                owner_id,
                name,
                status: CollectionStatus::Active,
                post_ids: BTreeSet::new(),
                version: 0,
                created_at: Utc::now(),
            },
            events: Vec::new(),
        };
        collection
            .events
            .push(DomainEvent::CollectionCreated { collection_id: id, owner_id });
        Ok(collection)
    }

    /// Rebuild from database state
    pub fn from_record(record: CollectionRecord) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// Add a post. Returns `false` without recording anything if it is already present.
    pub fn add_post(&mut self, requester_id: Uuid, post: &Post) -> Result<bool, DomainError> {
        self.ensure_owner(requester_id)?;
        self.ensure_active()?;
        post.ensure_active()?;

        if !self.record.post_ids.insert(post.id()) {
            return Ok(false);
        }
        self.events.push(DomainEvent::CollectionPostAdded {
            collection_id: self.record.id,
            post_id: post.id(),
            owner_id: self.record.owner_id,
        });
        Ok(true)
    }

    /// Remove a post. Returns `false` without recording anything if it was absent.
    pub fn remove_post(&mut self, requester_id: Uuid, post_id: Uuid) -> Result<bool, DomainError> {
        self.ensure_owner(requester_id)?;
        self.ensure_active()?;

        if !self.record.post_ids.remove(&post_id) {
            return Ok(false);
        }
        self.events.push(DomainEvent::CollectionPostRemoved {
            collection_id: self.record.id,
            post_id,
            owner_id: self.record.owner_id,
        });
        Ok(true)
    }

    /// Soft-delete; the posts it held are released
    pub fn delete(&mut self, requester_id: Uuid) -> Result<(), DomainError> {
        self.ensure_owner(requester_id)?;
        self.ensure_active()?;

        let post_ids = std::mem::take(&mut self.record.post_ids);
        self.record.status = CollectionStatus::Deleted;
        self.events.push(DomainEvent::CollectionDeleted {
            collection_id: self.record.id,
            owner_id: self.record.owner_id,
            post_ids: post_ids.into_iter().collect(),
        });
        Ok(())
    }

    fn ensure_owner(&self, requester_id: Uuid) -> Result<(), DomainError> {
        if requester_id != self.record.owner_id {
            return Err(DomainError::NotOwner {
                aggregate: "collection",
                aggregate_id: self.record.id,
                member_id: requester_id,
            });
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.record.status == CollectionStatus::Deleted {
            return Err(DomainError::Deleted {
                aggregate: "collection",
                id: self.record.id,
            });
        }
        Ok(())
    }

    pub fn record(&self) -> &CollectionRecord {
        &self.record
    }

    pub fn owner_id(&self) -> Uuid {
        self.record.owner_id
    }

    pub fn status(&self) -> CollectionStatus {
        self.record.status
    }

    pub fn contains(&self, post_id: Uuid) -> bool {
        self.record.post_ids.contains(&post_id)
    }
}

impl Aggregate for Collection {
    fn aggregate_type() -> &'static str {
        "Collection"
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
