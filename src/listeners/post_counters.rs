//! Post and comment counter listeners
//!
//! Content counters move by atomic deltas only.

use async_trait::async_trait;
use uuid::Uuid;

use crate::counters::{Counter, CounterMaterializer};
use crate::domain::{DomainEvent, EventEnvelope};
use crate::events::{EventHandler, HandlerError};
use crate::store::Transaction;

async fn increment<T: Transaction>(tx: &mut T, counter: Counter, id: Uuid) -> Result<(), HandlerError> {
    if !tx.increment(counter, id).await? {
        tracing::debug!(%counter, %id, "Counter row missing; increment skipped");
    }
    Ok(())
}

async fn decrement<T: Transaction>(tx: &mut T, counter: Counter, id: Uuid) -> Result<(), HandlerError> {
    if !tx.decrement_floor_zero(counter, id).await? {
        tracing::debug!(%counter, %id, "Counter already at zero or row missing");
    }
    Ok(())
}

/// `Post.heart_count` from PostHeartAdded / PostHeartRemoved
pub struct HeartCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for HeartCounter {
    fn name(&self) -> &'static str {
        "post_heart_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        match &envelope.event {
            DomainEvent::PostHeartAdded { post_id, .. } => {
                increment(tx, Counter::PostHearts, *post_id).await
            }
            DomainEvent::PostHeartRemoved { post_id, .. } => {
                decrement(tx, Counter::PostHearts, *post_id).await
            }
            _ => Ok(()),
        }
    }
}

/// `Post.view_count`; authors reading their own post are not counted
pub struct ViewCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for ViewCounter {
    fn name(&self) -> &'static str {
        "post_view_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        match &envelope.event {
            DomainEvent::PostViewed {
                post_id,
                viewer_id,
                author_id,
            } if viewer_id != author_id => increment(tx, Counter::PostViews, *post_id).await,
            _ => Ok(()),
        }
    }
}

/// `Post.comment_count`, replies included
pub struct CommentCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for CommentCounter {
    fn name(&self) -> &'static str {
        "post_comment_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        match &envelope.event {
            DomainEvent::CommentCreated { post_id, .. } => {
                increment(tx, Counter::PostComments, *post_id).await
            }
            DomainEvent::CommentDeleted { post_id, .. } => {
                decrement(tx, Counter::PostComments, *post_id).await
            }
            _ => Ok(()),
        }
    }
}

/// `Comment.reply_count` of the parent; top-level comments are ignored
pub struct ReplyCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for ReplyCounter {
    fn name(&self) -> &'static str {
        "comment_reply_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        match &envelope.event {
            DomainEvent::CommentCreated {
                parent_comment_id: Some(parent_id),
                ..
            } => increment(tx, Counter::CommentReplies, *parent_id).await,
            DomainEvent::CommentDeleted {
                parent_comment_id: Some(parent_id),
                ..
            } => decrement(tx, Counter::CommentReplies, *parent_id).await,
            _ => Ok(()),
        }
    }
}

/// `Post.collected_count` from collection membership changes
pub struct CollectedCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for CollectedCounter {
    fn name(&self) -> &'static str {
        "post_collected_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        match &envelope.event {
            DomainEvent::CollectionPostAdded { post_id, .. } => {
                increment(tx, Counter::PostCollected, *post_id).await
            }
            DomainEvent::CollectionPostRemoved { post_id, .. } => {
                decrement(tx, Counter::PostCollected, *post_id).await
            }
            DomainEvent::CollectionDeleted { post_ids, .. } => {
                for post_id in post_ids {
                    decrement(tx, Counter::PostCollected, *post_id).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// `Member.post_count` from PostCreated / PostDeleted
pub struct PostCountListener;

#[async_trait]
impl<T: Transaction> EventHandler<T> for PostCountListener {
    fn name(&self) -> &'static str {
        "member_post_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        match &envelope.event {
            DomainEvent::PostCreated { author_id, .. } => {
                increment(tx, Counter::MemberPosts, *author_id).await
            }
            DomainEvent::PostDeleted { author_id, .. } => {
                decrement(tx, Counter::MemberPosts, *author_id).await
            }
            _ => Ok(()),
        }
    }
}
