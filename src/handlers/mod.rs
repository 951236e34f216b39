//! Command Handlers module
//!
//! Each handler opens a unit of work, loads and mutates aggregates, saves
//! them and commits. Listeners run only after the commit succeeds.

mod collection_handler;
mod commands;
mod comment_handler;
mod follow_handler;
mod friendship_handler;
mod member_handler;
mod post_handler;


pub use collection_handler::CollectionHandler;
pub use commands::*;
pub use comment_handler::CommentHandler;
pub use follow_handler::FollowHandler;
pub use friendship_handler::FriendshipHandler;
pub use member_handler::MemberHandler;
pub use post_handler::PostHandler;

use uuid::Uuid;

use crate::aggregate::Member;
use crate::domain::DomainError;
use crate::error::AppResult;
use crate::events::UnitOfWork;
use crate::store::{MemberRepository, Store};

/// Turn a missing row into a `NotFound` domain error
pub(crate) fn found<T>(value: Option<T>, aggregate: &'static str, id: Uuid) -> AppResult<T> {
    value.ok_or_else(|| DomainError::not_found(aggregate, id).into())
}

/// Load a member that must exist and be ACTIVE to perform `action`
pub(crate) async fn active_member<S: Store>(
    uow: &mut UnitOfWork<S>,
    member_id: Uuid,
    action: &'static str,
) -> AppResult<Member> {
    let member = uow.tx().find_member(member_id).await?;
    let member = found(member, "member", member_id)?;
    if !member.is_active() {
        return Err(DomainError::invalid_transition("member", action, member.status()).into());
    }
    Ok(member)
}

/// Every command handler sharing one dispatcher
pub struct Handlers<S: Store> {
    pub members: MemberHandler<S>,
    pub posts: PostHandler<S>,
    pub comments: CommentHandler<S>,
    pub follows: FollowHandler<S>,
    pub friendships: FriendshipHandler<S>,
    pub collections: CollectionHandler<S>,
}

impl<S: Store> Handlers<S> {
    pub fn new(dispatcher: crate::events::Dispatcher<S>) -> Self {
        Self {
            members: MemberHandler::new(dispatcher.clone()),
            posts: PostHandler::new(dispatcher.clone()),
            comments: CommentHandler::new(dispatcher.clone()),
            follows: FollowHandler::new(dispatcher.clone()),
            friendships: FriendshipHandler::new(dispatcher.clone()),
            collections: CollectionHandler::new(dispatcher),
        }
    }
}
