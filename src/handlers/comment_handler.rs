//! Comment Handler

use uuid::Uuid;

use crate::aggregate::Comment;
use crate::domain::OperationContext;
use crate::error::AppResult;
use crate::events::Dispatcher;
use crate::store::{CommentRepository, Store};

use super::post_handler::load_post;
use super::{active_member, found, CreateCommentCommand};

pub struct CommentHandler<S: Store> {
    dispatcher: Dispatcher<S>,
}

impl<S: Store> CommentHandler<S> {
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    /// Comment on a post, or reply to one of its top-level comments
    pub async fn create(
        &self,
        command: CreateCommentCommand,
        context: &OperationContext,
    ) -> AppResult<Uuid> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let post = load_post(&mut uow, command.post_id).await?;
        let author = active_member(&mut uow, command.author_id, "comment as").await?;

        let parent = match command.parent_comment_id {
            Some(parent_id) => {
                let parent = uow.tx().find_comment(parent_id).await?;
                Some(found(parent, "comment", parent_id)?)
            }
            None => None,
        };

        let mut comment = Comment::create(
            command.comment_id,
            &post,
            command.author_id,
            author.nickname().to_string(),
            command.content,
            parent.as_ref(),
        )?;
        uow.save(&mut comment).await?;
        uow.commit().await?;

        tracing::info!(
            comment_id = %command.comment_id,
            post_id = %command.post_id,
            reply = command.parent_comment_id.is_some(),
            "Comment created"
        );
        Ok(command.comment_id)
    }

    pub async fn delete(
        &self,
        comment_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let comment = uow.tx().find_comment(comment_id).await?;
        let mut comment = found(comment, "comment", comment_id)?;

        comment.delete(requester_id)?;
        uow.save(&mut comment).await?;
        uow.commit().await?;

        tracing::info!(%comment_id, "Comment deleted");
        Ok(())
    }
}
