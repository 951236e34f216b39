//! Collection Handler

use uuid::Uuid;

use crate::aggregate::Collection;
use crate::domain::OperationContext;
use crate::error::AppResult;
use crate::events::{Dispatcher, UnitOfWork};
use crate::store::{CollectionRepository, Store};

use super::post_handler::load_post;
use super::{active_member, found, CreateCollectionCommand};

pub struct CollectionHandler<S: Store> {
    dispatcher: Dispatcher<S>,
}

impl<S: Store> CollectionHandler<S> {
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    pub async fn create(
        &self,
        command: CreateCollectionCommand,
        context: &OperationContext,
    ) -> AppResult<Uuid> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        active_member(&mut uow, command.owner_id, "create a collection as").await?;

        let mut collection = Collection::create(command.collection_id, command.owner_id, command.name)?;
        uow.save(&mut collection).await?;
        uow.commit().await?;

        tracing::info!(collection_id = %command.collection_id, "Collection created");
        Ok(command.collection_id)
    }

    /// Add a post. Returns `false` if it was already in the collection.
    pub async fn add_post(
        &self,
        collection_id: Uuid,
        post_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<bool> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut collection = load_collection(&mut uow, collection_id).await?;
        let post = load_post(&mut uow, post_id).await?;

        if !collection.add_post(requester_id, &post)? {
            uow.rollback().await?;
            return Ok(false);
        }
        uow.save(&mut collection).await?;
        uow.commit().await?;
        Ok(true)
    }

    /// Remove a post. Returns `false` if it was not in the collection.
    pub async fn remove_post(
        &self,
        collection_id: Uuid,
        post_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<bool> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut collection = load_collection(&mut uow, collection_id).await?;

        if !collection.remove_post(requester_id, post_id)? {
            uow.rollback().await?;
            return Ok(false);
        }
        uow.save(&mut collection).await?;
        uow.commit().await?;
        Ok(true)
    }

    pub async fn delete(
        &self,
        collection_id: Uuid,
        requester_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<()> {
        let mut uow = self.dispatcher.begin(context.clone()).await?;
        let mut collection = load_collection(&mut uow, collection_id).await?;

        collection.delete(requester_id)?;
        uow.save(&mut collection).await?;
        uow.commit().await?;

        tracing::info!(%collection_id, "Collection deleted");
        Ok(())
    }
}

async fn load_collection<S: Store>(
    uow: &mut UnitOfWork<S>,
    collection_id: Uuid,
) -> AppResult<Collection> {
    let collection = uow.tx().find_collection(collection_id).await?;
    found(collection, "collection", collection_id)
}
