//! Store module
//!
//! Persistence surface consumed by the command handlers and listeners: one
//! repository per aggregate family, the counter primitives, and the outbox
//! tables. Every operation runs inside a [`Transaction`] (the unit of work);
//! nothing is visible to other transactions until `commit`.

mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Collection, Comment, Follow, Friendship, Member, Post};
use crate::counters::CounterMaterializer;
use crate::domain::EventEnvelope;

/// Persist an aggregate's own columns.
///
/// A new aggregate (`version() == 0`) is inserted at version 1. An existing
/// one is updated only if the stored version still matches, otherwise the
/// save fails with [`StoreError::ConcurrencyConflict`]. Counter columns and
/// denormalized author nicknames are never written by a save.
#[async_trait]
pub trait SaveAggregate<A: Aggregate> {
    async fn save(&mut self, aggregate: &mut A) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MemberRepository {
    async fn find_member(&mut self, id: Uuid) -> Result<Option<Member>, StoreError>;
}

#[async_trait]
pub trait PostRepository {
    async fn find_post(&mut self, id: Uuid) -> Result<Option<Post>, StoreError>;

    /// Rewrite the denormalized author nickname on every post by `author_id`
    async fn rename_post_author(&mut self, author_id: Uuid, nickname: &str)
        -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CommentRepository {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>, StoreError>;

    /// Rewrite the denormalized author nickname on every comment by `author_id`
    async fn rename_comment_author(
        &mut self,
        author_id: Uuid,
        nickname: &str,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait FollowRepository {
    async fn find_follow(&mut self, id: Uuid) -> Result<Option<Follow>, StoreError>;

    /// The single row for the (follower, following) pair, in any status
    async fn find_follow_between(
        &mut self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>, StoreError>;
}

#[async_trait]
pub trait FriendshipRepository {
    async fn find_friendship(&mut self, id: Uuid) -> Result<Option<Friendship>, StoreError>;

    /// The PENDING or ACCEPTED row from `member_id` to `friend_member_id`, if any
    async fn find_open_friendship(
        &mut self,
        member_id: Uuid,
        friend_member_id: Uuid,
    ) -> Result<Option<Friendship>, StoreError>;

    /// Friends whose ACCEPTED row is mirrored by an ACCEPTED row back to `member_id`
    async fn count_mutual_friends(&mut self, member_id: Uuid) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait CollectionRepository {
    async fn find_collection(&mut self, id: Uuid) -> Result<Option<Collection>, StoreError>;
}

/// Heart records, one per (post, member)
#[async_trait]
pub trait HeartRepository {
    async fn has_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError>;

    /// Returns `false` if the heart already existed
    async fn insert_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError>;

    /// Returns `false` if there was no heart to delete
    async fn delete_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError>;
}

/// Durable copy of every published event, written with the triggering change
#[async_trait]
pub trait OutboxRepository {
    async fn append_outbox(&mut self, envelopes: &[EventEnvelope]) -> Result<(), StoreError>;

    /// Undispatched events that occurred at or before `occurred_before`, oldest first
    async fn pending_outbox(
        &mut self,
        occurred_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError>;

    /// Returns `false` if the row was already dispatched or does not exist
    async fn mark_dispatched(&mut self, event_id: Uuid) -> Result<bool, StoreError>;

    async fn count_pending(&mut self) -> Result<i64, StoreError>;

    /// Delete rows dispatched before `before`
    async fn purge_dispatched(&mut self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Per-handler idempotency markers
#[async_trait]
pub trait HandlerLedger {
    /// Record that `handler` is processing `event_id`.
    ///
    /// Returns `false` if a committed marker already exists, meaning the
    /// handler's effects have already been applied.
    async fn record_handler_run(&mut self, event_id: Uuid, handler: &str)
        -> Result<bool, StoreError>;

    async fn purge_handler_runs(&mut self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// A handler that exhausted its attempts for one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub handler: String,
    pub error: String,
    pub attempts: i32,
    pub payload: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterRepository {
    async fn record_dead_letter(&mut self, dead_letter: &DeadLetter) -> Result<(), StoreError>;

    /// Most recent first
    async fn list_dead_letters(&mut self, limit: i64) -> Result<Vec<DeadLetter>, StoreError>;
}

/// One unit of work against the store
#[async_trait]
pub trait Transaction:
    MemberRepository
    + PostRepository
    + CommentRepository
    + FollowRepository
    + FriendshipRepository
    + CollectionRepository
    + HeartRepository
    + OutboxRepository
    + HandlerLedger
    + DeadLetterRepository
    + CounterMaterializer
    + SaveAggregate<Member>
    + SaveAggregate<Post>
    + SaveAggregate<Comment>
    + SaveAggregate<Follow>
    + SaveAggregate<Friendship>
    + SaveAggregate<Collection>
    + Send
    + Sized
    + 'static
{
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Source of units of work
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}
