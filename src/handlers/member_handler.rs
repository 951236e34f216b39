//! Member Handler
//!
//! Registration and lifecycle of members.

use uuid::Uuid;

use crate::aggregate::Member;
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;
use crate::events::Dispatcher;
use crate::store::{MemberRepository, Store};

use super::{found, RegisterMemberCommand, UpdateProfileCommand};

/// Handler for member commands
pub struct MemberHandler<S: Store> {
    dispatcher: Dispatcher<S>,
}

impl<S: Store> MemberHandler<S> {
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    /// Register a member; returns its id
    pub async fn register(
        &self,
        command: RegisterMemberCommand,
        context: &OperationContext,
    ) -> AppResult<Uuid> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;

        if uow.tx().find_member(command.member_id).await?.is_some() {
            return Err(DomainError::AlreadyExists("member").into());
        }

        let mut member = Member::register(command.member_id, command.email, command.nickname)?;
        uow.save(&mut member).await?;
        uow.commit().await?;

        tracing::info!(member_id = %command.member_id, "Member registered");
        Ok(command.member_id)
    }

    pub async fn activate(&self, member_id: Uuid, context: &OperationContext) -> AppResult<()> {
        self.transition(member_id, context, Member::activate).await
    }

    pub async fn deactivate(&self, member_id: Uuid, context: &OperationContext) -> AppResult<()> {
        self.transition(member_id, context, Member::deactivate).await
    }

    pub async fn update_profile(
        &self,
        command: UpdateProfileCommand,
        context: &OperationContext,
    ) -> AppResult<()> {
        let changes = command.changes();
        self.transition(command.member_id, context, move |member| {
            member.update_profile(changes)
        })
        .await
    }

    async fn transition<F>(
        &self,
        member_id: Uuid,
        context: &OperationContext,
        apply: F,
    ) -> AppResult<()>
    where
        F: FnOnce(&mut Member) -> Result<(), DomainError>,
    {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let found_member = uow.tx().find_member(member_id).await?;
        let mut member = found(found_member, "member", member_id)?;

        apply(&mut member)?;
        uow.save(&mut member).await?;
        uow.commit().await?;
        Ok(())
    }
}
