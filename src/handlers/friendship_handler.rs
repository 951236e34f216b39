//! Friendship Handler
//!
//! Friend requests are directional rows. Mutual friendship needs an ACCEPTED
//! row in each direction; creating the mirror row is up to the caller.

use uuid::Uuid;

use crate::aggregate::{Friendship, FriendshipStatus};
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;
use crate::events::Dispatcher;
use crate::store::{FriendshipRepository, Store};

use super::{active_member, found};

pub struct FriendshipHandler<S: Store> {
    dispatcher: Dispatcher<S>,
}

impl<S: Store> FriendshipHandler<S> {
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    /// Send a friend request; returns the new friendship id
    pub async fn request(
        &self,
        from_id: Uuid,
        to_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Uuid> {
        if from_id == to_id {
            return Err(DomainError::SelfRelation("befriend").into());
        }

        let mut uow = self.dispatcher.begin(context.clone()).await?;
        active_member(&mut uow, from_id, "befriend as").await?;
        active_member(&mut uow, to_id, "befriend").await?;

        if uow.tx().find_open_friendship(from_id, to_id).await?.is_some() {
            return Err(DomainError::AlreadyExists("friend request").into());
        }

        let mut friendship = Friendship::request(Uuid::new_v4(), from_id, to_id)?;
        uow.save(&mut friendship).await?;
        uow.commit().await?;

        tracing::info!(%from_id, %to_id, "Friend request sent");
        Ok(friendship.record().id)
    }

    pub async fn accept(
        &self,
        friendship_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        self.transition(friendship_id, context, |f| f.accept(requester_id))
            .await
    }

    pub async fn reject(
        &self,
        friendship_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        self.transition(friendship_id, context, |f| f.reject(requester_id))
            .await
    }

    /// End the friendship between `member_id` and `friend_member_id`.
    ///
    /// Every ACCEPTED row between the two, in either direction, is closed.
    pub async fn unfriend(
        &self,
        member_id: Uuid,
        friend_member_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;

        let mut closed = 0;
        for (from, to) in [(member_id, friend_member_id), (friend_member_id, member_id)] {
            let Some(mut friendship) = uow.tx().find_open_friendship(from, to).await? else {
                continue;
            };
            if friendship.status() != FriendshipStatus::Accepted {
                continue;
            }
            friendship.unfriend(member_id)?;
            uow.save(&mut friendship).await?;
            closed += 1;
        }

        if closed == 0 {
            return Err(DomainError::not_found("friendship", friend_member_id).into());
        }
        uow.commit().await?;

        tracing::info!(%member_id, %friend_member_id, rows = closed, "Friendship terminated");
        Ok(())
    }

    /// Friends of `member_id` confirmed by an ACCEPTED row in both directions
    pub async fn mutual_friend_count(
        &self,
        member_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<i64> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let count = uow.tx().count_mutual_friends(member_id).await?;
        uow.rollback().await?;
        Ok(count)
    }

    async fn transition<F>(
        &self,
        friendship_id: Uuid,
        context: &OperationContext,
        apply: F,
    ) -> AppResult<()>
    where
        F: FnOnce(&mut Friendship) -> Result<(), DomainError>,
    {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let friendship = uow.tx().find_friendship(friendship_id).await?;
        let mut friendship = found(friendship, "friendship", friendship_id)?;

        apply(&mut friendship)?;
        uow.save(&mut friendship).await?;
        uow.commit().await?;

        tracing::info!(%friendship_id, status = %friendship.status(), "Friendship updated");
        Ok(())
    }
}
