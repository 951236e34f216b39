//! Commit-Deferred Dispatcher
//!
//! A [`UnitOfWork`] pairs a store transaction with its Pending Event
//! Buffer. Publishing only appends to the buffer. On `commit` the buffered
//! envelopes are written to the outbox inside the same transaction, the
//! transaction commits, and only then are the envelopes released to the
//! executor. On `rollback`, or when the unit of work is dropped, the buffer
//! is discarded and nothing is dispatched.

use crate::aggregate::Aggregate;
use crate::domain::{DomainEvent, EventEnvelope, OperationContext};
use crate::store::{OutboxRepository, SaveAggregate, Store, StoreError, Transaction};

use super::Executor;

/// Ordered events raised during one unit of work
#[derive(Debug, Default)]
pub struct EventBuffer {
    envelopes: Vec<EventEnvelope>,
}

impl EventBuffer {
    pub fn push(&mut self, envelope: EventEnvelope) {
        self.envelopes.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn envelopes(&self) -> &[EventEnvelope] {
        &self.envelopes
    }

    fn drain(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.envelopes)
    }
}

/// Opens units of work whose events go to one executor
pub struct Dispatcher<S: Store> {
    store: S,
    executor: Executor<S>,
}

impl<S: Store> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<S: Store> Dispatcher<S> {
    pub fn new(store: S, executor: Executor<S>) -> Self {
        Self { store, executor }
    }

    /// Begin a unit of work; a correlation id is assigned if the context has none
    pub async fn begin(&self, mut context: OperationContext) -> Result<UnitOfWork<S>, StoreError> {
        context.ensure_correlation_id();
        let tx = self.store.begin().await?;
        Ok(UnitOfWork {
            tx,
            buffer: EventBuffer::default(),
            context,
            executor: self.executor.clone(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn executor(&self) -> &Executor<S> {
        &self.executor
    }
}

/// A transaction plus the events it has raised so far
pub struct UnitOfWork<S: Store> {
    tx: S::Tx,
    buffer: EventBuffer,
    context: OperationContext,
    executor: Executor<S>,
}

impl<S: Store> UnitOfWork<S> {
    /// Append one event to the pending buffer; handlers do not see it yet
    pub fn publish(&mut self, event: DomainEvent) {
        self.buffer.push(EventEnvelope::new(event, &self.context));
    }

    /// Move the aggregate's recorded events into the buffer without saving it
    pub fn record<A: Aggregate>(&mut self, aggregate: &mut A) {
        for event in aggregate.take_events() {
            self.publish(event);
        }
    }

    /// Persist the aggregate, then move its recorded events into the buffer
    pub async fn save<A>(&mut self, aggregate: &mut A) -> Result<(), StoreError>
    where
        A: Aggregate,
        S::Tx: SaveAggregate<A>,
    {
        SaveAggregate::<A>::save(&mut self.tx, aggregate).await?;
        self.record(aggregate);
        Ok(())
    }

    /// The underlying transaction, for reads and non-aggregate writes
    pub fn tx(&mut self) -> &mut S::Tx {
        &mut self.tx
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn pending(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Write the outbox, commit, then release the events to the executor
    pub async fn commit(self) -> Result<(), StoreError> {
        let Self {
            mut tx,
            mut buffer,
            executor,
            ..
        } = self;

        let envelopes = buffer.drain();
        if !envelopes.is_empty() {
            tx.append_outbox(&envelopes).await?;
        }
        tx.commit().await?;

        if !envelopes.is_empty() {
            tracing::debug!(count = envelopes.len(), "Releasing committed events");
            executor.submit(envelopes);
        }
        Ok(())
    }

    /// Roll back and discard every buffered event
    pub async fn rollback(self) -> Result<(), StoreError> {
        if !self.buffer.is_empty() {
            tracing::debug!(count = self.buffer.len(), "Discarding events of rolled back unit of work");
        }
        self.tx.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DispatchConfig, HandlerRegistry};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn dispatcher(store: &MemoryStore) -> Dispatcher<MemoryStore> {
        let executor = Executor::new(store.clone(), HandlerRegistry::new(), DispatchConfig::default());
        Dispatcher::new(store.clone(), executor)
    }

    #[tokio::test]
    async fn test_publish_stamps_correlation_id() {
        let store = MemoryStore::new();
        let correlation_id = Uuid::new_v4();
        let context = OperationContext::new().with_correlation_id(correlation_id);

        let mut uow = dispatcher(&store).begin(context).await.unwrap();
        uow.publish(DomainEvent::MemberActivated { member_id: Uuid::new_v4() });

        assert_eq!(uow.pending().len(), 1);
        assert_eq!(uow.pending().envelopes()[0].correlation_id, Some(correlation_id));
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_writes_outbox_rollback_does_not() {
        let store = MemoryStore::new();
        let dispatcher = dispatcher(&store);

        let mut uow = dispatcher.begin(OperationContext::new()).await.unwrap();
        uow.publish(DomainEvent::MemberActivated { member_id: Uuid::new_v4() });
        uow.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_pending().await.unwrap(), 0);
        drop(tx);

        let mut uow = dispatcher.begin(OperationContext::new()).await.unwrap();
        uow.publish(DomainEvent::MemberActivated { member_id: Uuid::new_v4() });
        uow.commit().await.unwrap();
        dispatcher.executor().wait_idle().await;

        // No handlers are registered, so the row is closed straight away
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_pending().await.unwrap(), 0);
        let pending = tx.pending_outbox(chrono::Utc::now(), 10).await.unwrap();
        assert!(pending.is_empty());
    }
}
