//! Post Aggregate
//!
//! A restaurant review. Deletion is a status transition, never a physical
//! delete. Hearts and views do not change the post row: they only record
//! the fact, and the counters follow asynchronously.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent};

use super::{status_enum, Aggregate};

/// Post status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Active,
    Deleted,
}

status_enum!(PostStatus, "post", {
    Active => "ACTIVE",
    Deleted => "DELETED",
});

/// Persisted shape of a post row
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_nickname: String,
    pub restaurant_name: String,
    pub content: String,
    pub status: PostStatus,
    pub heart_count: i64,
    pub view_count: i64,
    pub comment_count: i64,
    pub collected_count: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Post Aggregate
#[derive(Debug, Clone)]
pub struct Post {
    record: PostRecord,
    events: Vec<DomainEvent>,
}

impl Post {
    /// Create a new post
    pub fn create(
        id: Uuid,
        author_id: Uuid,
        author_nickname: String,
        restaurant_name: String,
        content: String,
    ) -> Result<Self, DomainError> {
        if restaurant_name.trim().is_empty() {
            return Err(DomainError::InvalidInput("Restaurant name is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(DomainError::InvalidInput("Post content is required".to_string()));
        }

        let mut post = Self {
            record: PostRecord {
                id,
                author_id,
                author_nickname,
                restaurant_name: restaurant_name.trim().to_string(),
                content,
                status: PostStatus::Active,
                heart_count: 0,
                view_count: 0,
                comment_count: 0,
                collected_count: 0,
                version: 0,
                created_at: Utc::now(),
            },
            events: Vec::new(),
        };
        post.events.push(DomainEvent::PostCreated { post_id: id, author_id });
        Ok(post)
    }

    /// Rebuild from database state
    pub fn from_record(record: PostRecord) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// Soft-delete the post; only its author may do so
    pub fn delete(&mut self, requester_id: Uuid) -> Result<(), DomainError> {
        self.ensure_author(requester_id)?;
        self.ensure_active()?;

        self.record.status = PostStatus::Deleted;
        self.events.push(DomainEvent::PostDeleted {
            post_id: self.record.id,
            author_id: self.record.author_id,
        });
        Ok(())
    }

    /// Record that a member hearted this post
    pub fn record_heart(&mut self, member_id: Uuid) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.events.push(DomainEvent::PostHeartAdded {
            post_id: self.record.id,
            member_id,
        });
        Ok(())
    }

    /// Record that a member withdrew their heart
    pub fn record_heart_removed(&mut self, member_id: Uuid) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.events.push(DomainEvent::PostHeartRemoved {
            post_id: self.record.id,
            member_id,
        });
        Ok(())
    }

    /// Record that a member read this post
    pub fn record_view(&mut self, viewer_id: Uuid) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.events.push(DomainEvent::PostViewed {
            post_id: self.record.id,
            viewer_id,
            author_id: self.record.author_id,
        });
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.record.status == PostStatus::Deleted {
            return Err(DomainError::Deleted {
                aggregate: "post",
                id: self.record.id,
            });
        }
        Ok(())
    }

    fn ensure_author(&self, requester_id: Uuid) -> Result<(), DomainError> {
        if requester_id != self.record.author_id {
            return Err(DomainError::NotOwner {
                aggregate: "post",
                aggregate_id: self.record.id,
                member_id: requester_id,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn record(&self) -> &PostRecord {
        &self.record
    }

    pub fn author_id(&self) -> Uuid {
        self.record.author_id
    }

    pub fn status(&self) -> PostStatus {
        self.record.status
    }

    pub fn is_active(&self) -> bool {
        self.record.status == PostStatus::Active
    }

    pub fn heart_count(&self) -> i64 {
        self.record.heart_count
    }

    pub fn view_count(&self) -> i64 {
        self.record.view_count
    }

    pub fn comment_count(&self) -> i64 {
        self.record.comment_count
    }

    pub fn collected_count(&self) -> i64 {
        self.record.collected_count
    }
}

impl Aggregate for Post {
    fn aggregate_type() -> &'static str {
        "Post"
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

    fn new_post(author_id: Uuid) -> Post {
        let mut post = Post::create(
            Uuid::new_v4(),
            author_id,
            "alice".to_string(),
            "Mapo Galbi".to_string(),
            "Great pork ribs".to_string(),
        )
        .unwrap();
        post.take_events();
        post
    }

    #[test]
    fn test_create_records_post_created() {
        let author_id = Uuid::new_v4();
        let mut post = Post::create(
            Uuid::new_v4(),
            author_id,
            "alice".to_string(),
            "  Mapo Galbi ".to_string(),
            "Great".to_string(),
        )
        .unwrap();

        assert_eq!(post.record().restaurant_name, "Mapo Galbi");
        assert_eq!(
            post.take_events(),
            vec![DomainEvent::PostCreated { post_id: post.id(), author_id }]
        );
    }

    #[test]
    fn test_only_author_can_delete() {
        let author_id = Uuid::new_v4();
        let mut post = new_post(author_id);

        let result = post.delete(Uuid::new_v4());
        assert!(matches!(result, Err(DomainError::NotOwner { .. })));
        assert!(post.is_active());
        assert!(post.take_events().is_empty());

        post.delete(author_id).unwrap();
        assert_eq!(post.status(), PostStatus::Deleted);
    }

    #[test]
    fn test_deleted_post_rejects_interaction() {
        let author_id = Uuid::new_v4();
        let mut post = new_post(author_id);
        post.delete(author_id).unwrap();
        post.take_events();

        assert!(matches!(post.delete(author_id), Err(DomainError::Deleted { .. })));
        assert!(post.record_heart(Uuid::new_v4()).is_err());
        assert!(post.record_view(Uuid::new_v4()).is_err());
        assert!(post.take_events().is_empty());
    }

    #[test]
    fn test_view_carries_author() {
        let author_id = Uuid::new_v4();
        let viewer_id = Uuid::new_v4();
        let mut post = new_post(author_id);

        post.record_view(viewer_id).unwrap();
        assert_eq!(
            post.take_events(),
            vec![DomainEvent::PostViewed { post_id: post.id(), viewer_id, author_id }]
        );
    }
}
