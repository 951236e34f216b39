//! Follow Handler
//!
//! One follow row exists per (follower, following) pair. Following again
//! after an unfollow reactivates that row instead of inserting a new one.

use uuid::Uuid;

use crate::aggregate::{Follow, FollowStatus};
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;
use crate::events::Dispatcher;
use crate::store::{FollowRepository, MemberRepository, Store};

use super::{active_member, found};

pub struct FollowHandler<S: Store> {
    dispatcher: Dispatcher<S>,
}

impl<S: Store> FollowHandler<S> {
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    /// Follow `following_id`; returns the follow row id
    pub async fn follow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Uuid> {
        if follower_id == following_id {
            return Err(DomainError::SelfRelation("follow").into());
        }

        let mut uow = self.dispatcher.begin(context.clone()).await?;
        active_member(&mut uow, follower_id, "follow as").await?;
        active_member(&mut uow, following_id, "follow").await?;

        let existing = uow.tx().find_follow_between(follower_id, following_id).await?;
        let mut follow = match existing {
            Some(follow) if follow.status() == FollowStatus::Blocked => {
                return Err(
                    DomainError::invalid_transition("follow", "follow", follow.status()).into(),
                );
            }
            Some(mut follow) => {
                follow.reactivate()?;
                follow
            }
            None => Follow::create(Uuid::new_v4(), follower_id, following_id)?,
        };

        uow.save(&mut follow).await?;
        uow.commit().await?;

        tracing::info!(%follower_id, %following_id, "Follow started");
        Ok(follow.record().id)
    }

    pub async fn unfollow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let existing = uow.tx().find_follow_between(follower_id, following_id).await?;
        let mut follow = found(existing, "follow", following_id)?;

        follow.unfollow()?;
        uow.save(&mut follow).await?;
        uow.commit().await?;

        tracing::info!(%follower_id, %following_id, "Unfollowed");
        Ok(())
    }

    /// Stop `blocked_id` from following `blocker_id`
    pub async fn block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        if blocker_id == blocked_id {
            return Err(DomainError::SelfRelation("block").into());
        }

        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let blocked = uow.tx().find_follow_between(blocked_id, blocker_id).await?;
        let mut follow = match blocked {
            Some(mut follow) => {
                follow.block()?;
                follow
            }
            None => {
                let member = uow.tx().find_member(blocked_id).await?;
                found(member, "member", blocked_id)?;
                Follow::create_blocked(Uuid::new_v4(), blocked_id, blocker_id)?
            }
        };

        uow.save(&mut follow).await?;
        uow.commit().await?;

        tracing::info!(%blocker_id, %blocked_id, "Follow blocked");
        Ok(())
    }
}
