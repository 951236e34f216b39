//! Comment Aggregate
//!
//! Comments on a post, with one level of replies.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent};

use super::{status_enum, Aggregate, Post};

/// Comment status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStatus {
    Active,
    Deleted,
}

status_enum!(CommentStatus, "comment", {
    Active => "ACTIVE",
    Deleted => "DELETED",
});

/// Persisted shape of a comment row
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_nickname: String,
    pub parent_comment_id: Option<Uuid>,
    pub parent_author_id: Option<Uuid>,
    pub content: String,
    pub status: CommentStatus,
    pub reply_count: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Comment Aggregate
#[derive(Debug, Clone)]
pub struct Comment {
    record: CommentRecord,
    events: Vec<DomainEvent>,
}

impl Comment {
    /// Write a comment on `post`, optionally as a reply to `parent`.
    ///
    /// Replies must target an active top-level comment of the same post.
    pub fn create(
        id: Uuid,
        post: &Post,
        author_id: Uuid,
        author_nickname: String,
        content: String,
        parent: Option<&Comment>,
    ) -> Result<Self, DomainError> {
        post.ensure_active()?;
        if content.trim().is_empty() {
            return Err(DomainError::InvalidInput("Comment content is required".to_string()));
        }

        let (parent_comment_id, parent_author_id) = match parent {
            Some(parent) => {
                parent.ensure_active()?;
                if parent.record.post_id != post.id() {
                    return Err(DomainError::InvalidInput(
                        "Parent comment belongs to a different post".to_string(),
                    ));
                }
                if parent.record.parent_comment_id.is_some() {
                    return Err(DomainError::InvalidInput(
                        "Replies cannot be nested".to_string(),
                    ));
                }
                (Some(parent.id()), Some(parent.record.author_id))
            }
            None => (None, None),
        };

        let mut comment = Self {
            record: CommentRecord {
                id,
                post_id: post.id(),
                author_id,
                author_nickname,
                parent_comment_id,
                parent_author_id,
                content,
                status: CommentStatus::Active,
                reply_count: 0,
                version: 0,
                created_at: Utc::now(),
            },
            events: Vec::new(),
        };
        comment.events.push(DomainEvent::CommentCreated {
            comment_id: id,
            post_id: post.id(),
            author_id,
            parent_comment_id,
            parent_author_id,
        });
        Ok(comment)
    }

    /// Rebuild from database state
    pub fn from_record(record: CommentRecord) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// Soft-delete; only the author may do so
    pub fn delete(&mut self, requester_id: Uuid) -> Result<(), DomainError> {
        if requester_id != self.record.author_id {
            return Err(DomainError::NotOwner {
                aggregate: "comment",
                aggregate_id: self.record.id,
                member_id: requester_id,
            });
        }
        self.ensure_active()?;

        self.record.status = CommentStatus::Deleted;
        self.events.push(DomainEvent::CommentDeleted {
            comment_id: self.record.id,
            post_id: self.record.post_id,
            parent_comment_id: self.record.parent_comment_id,
            author_id: self.record.author_id,
        });
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.record.status == CommentStatus::Deleted {
            return Err(DomainError::Deleted {
                aggregate: "comment",
                id: self.record.id,
            });
        }
        Ok(())
    }

    pub fn record(&self) -> &CommentRecord {
        &self.record
    }

    pub fn post_id(&self) -> Uuid {
        self.record.post_id
    }

    pub fn status(&self) -> CommentStatus {
        self.record.status
    }

    pub fn reply_count(&self) -> i64 {
        self.record.reply_count
    }
}

impl Aggregate for Comment {
    fn aggregate_type() -> &'static str {
        "Comment"
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
