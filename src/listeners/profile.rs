//! Author nickname denormalization

use async_trait::async_trait;

use crate::domain::{DomainEvent, EventEnvelope};
use crate::events::{EventHandler, HandlerError};
use crate::store::Transaction;

/// Rewrites `author_nickname` on a member's posts and comments after a rename
pub struct AuthorNicknameSync;

#[async_trait]
impl<T: Transaction> EventHandler<T> for AuthorNicknameSync {
    fn name(&self) -> &'static str {
        "author_nickname_sync"
    }

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError> {
        let DomainEvent::MemberProfileUpdated {
            member_id,
            new_nickname: Some(nickname),
            ..
        } = &envelope.event
        else {
            return Ok(());
        };

        let posts = tx.rename_post_author(*member_id, nickname).await?;
        let comments = tx.rename_comment_author(*member_id, nickname).await?;

        tracing::debug!(%member_id, posts, comments, "Author nickname propagated");
        Ok(())
    }
}
