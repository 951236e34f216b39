//! Listeners
//!
//! The cross-aggregate reactions registered at start-up. Each runs in its
//! own unit of work after the triggering commit.

mod post_counters;
mod profile;
mod relationship_counters;

pub use post_counters::{
    CollectedCounter, CommentCounter, HeartCounter, PostCountListener, ReplyCounter, ViewCounter,
};
pub use profile::AuthorNicknameSync;
pub use relationship_counters::{FollowCounter, FriendCounter};

use std::sync::Arc;

use crate::domain::EventKind;
use crate::events::{HandlerRegistry, RegistryError};
use crate::store::Transaction;

/// Register every built-in listener
pub fn register_all<T: Transaction>(registry: &mut HandlerRegistry<T>) -> Result<(), RegistryError> {
    registry.register_many(
        &[EventKind::PostHeartAdded, EventKind::PostHeartRemoved],
        Arc::new(HeartCounter),
    )?;
    registry.register(EventKind::PostViewed, Arc::new(ViewCounter))?;
    registry.register_many(
        &[EventKind::CommentCreated, EventKind::CommentDeleted],
        Arc::new(CommentCounter),
    )?;
    registry.register_many(
        &[EventKind::CommentCreated, EventKind::CommentDeleted],
        Arc::new(ReplyCounter),
    )?;
    registry.register_many(
        &[
            EventKind::CollectionPostAdded,
            EventKind::CollectionPostRemoved,
            EventKind::CollectionDeleted,
        ],
        Arc::new(CollectedCounter),
    )?;
    registry.register_many(
        &[EventKind::PostCreated, EventKind::PostDeleted],
        Arc::new(PostCountListener),
    )?;
    registry.register_many(
        &[
            EventKind::FollowStarted,
            EventKind::Unfollowed,
            EventKind::FollowBlocked,
        ],
        Arc::new(FollowCounter),
    )?;
    registry.register_many(
        &[
            EventKind::FriendRequestAccepted,
            EventKind::FriendshipTerminated,
        ],
        Arc::new(FriendCounter),
    )?;
    registry.register(EventKind::MemberProfileUpdated, Arc::new(AuthorNicknameSync))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTransaction;

    #[test]
    fn test_register_all() {
        let mut registry = HandlerRegistry::<MemoryTransaction>::new();
        register_all(&mut registry).unwrap();

        let names: Vec<_> = registry
            .handlers_for(EventKind::CommentCreated)
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(names, vec!["post_comment_counter", "comment_reply_counter"]);
        assert!(registry.handlers_for(EventKind::FriendRequestSent).is_empty());
        assert_eq!(registry.len(), 18);
    }
}
