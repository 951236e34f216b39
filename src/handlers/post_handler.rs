//! Post Handler
//!
//! Reviews, hearts and views. Hearts and views never rewrite the post row;
//! they only publish events, and the counters follow asynchronously.

use uuid::Uuid;

use crate::aggregate::Post;
use crate::domain::OperationContext;
use crate::error::AppResult;
use crate::events::{Dispatcher, UnitOfWork};
use crate::store::{HeartRepository, PostRepository, Store};

use super::{active_member, found, CreatePostCommand};

pub struct PostHandler<S: Store> {
    dispatcher: Dispatcher<S>,
}

impl<S: Store> PostHandler<S> {
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    /// Publish a review as its (active) author
    pub async fn create(
        &self,
        command: CreatePostCommand,
        context: &OperationContext,
    ) -> AppResult<Uuid> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let author = active_member(&mut uow, command.author_id, "post as").await?;

        let mut post = Post::create(
            command.post_id,
            command.author_id,
            author.nickname().to_string(),
            command.restaurant_name,
            command.content,
        )?;
        uow.save(&mut post).await?;
        uow.commit().await?;

        tracing::info!(post_id = %command.post_id, author_id = %command.author_id, "Post created");
        Ok(command.post_id)
    }

    pub async fn delete(
        &self,
        post_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut post = load_post(&mut uow, post_id).await?;

        post.delete(requester_id)?;
        uow.save(&mut post).await?;
        uow.commit().await?;

        tracing::info!(%post_id, "Post deleted");
        Ok(())
    }

    /// Record a read of the post; the author's own reads are not counted
    pub async fn view(
        &self,
        post_id: Uuid,
        viewer_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut post = load_post(&mut uow, post_id).await?;

        post.record_view(viewer_id)?;
        uow.record(&mut post);
        uow.commit().await?;
        Ok(())
    }

    /// Heart a post. Returns `false` when the member had already hearted it.
    pub async fn add_heart(
        &self,
        post_id: Uuid,
        member_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<bool> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut post = load_post(&mut uow, post_id).await?;
        post.ensure_active()?;
        active_member(&mut uow, member_id, "heart as").await?;

        if uow.tx().has_heart(post_id, member_id).await?
            || !uow.tx().insert_heart(post_id, member_id).await?
        {
            uow.rollback().await?;
            return Ok(false);
        }

        post.record_heart(member_id)?;
        uow.record(&mut post);
        match uow.commit().await {
            Ok(()) => Ok(true),
            // A concurrent heart by the same member won the unique key
            Err(e) if e.is_duplicate() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Withdraw a heart. Returns `false` when there was none.
    pub async fn remove_heart(
        &self,
        post_id: Uuid,
        member_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<bool> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut post = load_post(&mut uow, post_id).await?;
        post.ensure_active()?;

        if !uow.tx().delete_heart(post_id, member_id).await? {
            uow.rollback().await?;
            return Ok(false);
        }

        post.record_heart_removed(member_id)?;
        uow.record(&mut post);
        uow.commit().await?;
        Ok(true)
    }
}

pub(crate) async fn load_post<S: Store>(uow: &mut UnitOfWork<S>, post_id: Uuid) -> AppResult<Post> {
    let post = uow.tx().find_post(post_id).await?;
    found(post, "post", post_id)
}
