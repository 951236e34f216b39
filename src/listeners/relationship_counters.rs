//! Relationship counter listeners
//!
//! Follower, following and friend counts are recomputed from the
//! relationship rows on every change. Events for one pair may arrive in
//! any order, and a recompute converges regardless.

use async_trait::async_trait;
use uuid::Uuid;

use crate::counters::{CounterMaterializer, DerivedCounter};
use crate::domain::{DomainEvent, EventEnvelope};
use crate::events::{EventHandler, HandlerError};
use crate::store::Transaction;

async fn recompute<T: Transaction>(
    tx: &mut T,
    counter: DerivedCounter,
    member_id: Uuid,
) -> Result<(), HandlerError> {
    if !tx.recompute(counter, member_id).await? {
        tracing::debug!(%counter, %member_id, "Member row missing; recompute skipped");
    }
    Ok(())
}

/// `followers_count` of the followed member and `followings_count` of the follower
pub struct FollowCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for FollowCounter {
    fn name(&self) -> &'static str {
        "member_follow_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        let (follower_id, following_id) = match &envelope.event {
            DomainEvent::FollowStarted {
                follower_id,
                following_id,
                ..
            }
            | DomainEvent::Unfollowed {
                follower_id,
                following_id,
                ..
            }
            | DomainEvent::FollowBlocked {
                follower_id,
                following_id,
                ..
            } => (*follower_id, *following_id),
            _ => return Ok(()),
        };

        recompute(tx, DerivedCounter::MemberFollowers, following_id).await?;
        recompute(tx, DerivedCounter::MemberFollowings, follower_id).await
    }
}

/// `friend_count` of both members of a friendship
pub struct FriendCounter;

#[async_trait]
impl<T: Transaction> EventHandler<T> for FriendCounter {
    fn name(&self) -> &'static str {
        "member_friend_counter"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        let (a, b) = match &envelope.event {
            DomainEvent::FriendRequestAccepted { from_id, to_id, .. } => (*from_id, *to_id),
            DomainEvent::FriendshipTerminated {
                member_id,
                friend_member_id,
            } => (*member_id, *friend_member_id),
            _ => return Ok(()),
        };

        recompute(tx, DerivedCounter::MemberFriends, a).await?;
        recompute(tx, DerivedCounter::MemberFriends, b).await
    }
}
