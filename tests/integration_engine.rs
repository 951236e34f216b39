//! Event pipeline tests over the in-memory store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use matzip::domain::{DomainEvent, EventEnvelope, EventKind};
use matzip::events::{DispatchConfig, EventHandler, HandlerError, HandlerRegistry};
use matzip::jobs::relay_outbox;
use matzip::listeners::HeartCounter;
use matzip::store::memory::MemoryTransaction;
use matzip::counters::{Counter, CounterMaterializer};
use matzip::store::{
    DeadLetterRepository, MemberRepository, MemoryStore, OutboxRepository,
    PostRepository, Store,
};
use tokio_test::assert_ok;
use uuid::Uuid;

mod common;

use common::{fast_dispatch, memory_engine, Engine};

/// Counts every invocation
struct Probe {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler<MemoryTransaction> for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn handle(&self, _: &EventEnvelope, _: &mut MemoryTransaction) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Always fails after touching a counter, which must be rolled back
struct Exploding;

#[async_trait]
impl EventHandler<MemoryTransaction> for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }

    async fn handle(
        &self,
        envelope: &EventEnvelope,
        tx: &mut MemoryTransaction,
    ) -> Result<(), HandlerError> {
        if let DomainEvent::PostHeartAdded { post_id, .. } = &envelope.event {
            tx.increment(Counter::PostViews, *post_id).await?;
        }
        Err(HandlerError::failed("boom"))
    }
}

/// Fails without touching anything
struct Failing;

#[async_trait]
impl EventHandler<MemoryTransaction> for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn handle(&self, _: &EventEnvelope, _: &mut MemoryTransaction) -> Result<(), HandlerError> {
        Err(HandlerError::failed("downstream unavailable"))
    }
}

/// Never finishes
struct Stuck;

#[async_trait]
impl EventHandler<MemoryTransaction> for Stuck {
    fn name(&self) -> &'static str {
        "stuck"
    }

    async fn handle(&self, _: &EventEnvelope, _: &mut MemoryTransaction) -> Result<(), HandlerError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Panics inside its unit of work
struct Panicking;

#[async_trait]
impl EventHandler<MemoryTransaction> for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn handle(&self, _: &EventEnvelope, _: &mut MemoryTransaction) -> Result<(), HandlerError> {
        panic!("handler bug");
    }
}

fn heart_registry(extra: Arc<dyn EventHandler<MemoryTransaction>>) -> HandlerRegistry<MemoryTransaction> {
    let mut registry = HandlerRegistry::<MemoryTransaction>::new();
    registry
        .register(EventKind::PostHeartAdded, Arc::new(HeartCounter))
        .unwrap();
    registry.register(EventKind::PostHeartAdded, extra).unwrap();
    registry
}

/// An author's post plus a second member to react to it
async fn seed(engine: &Engine<MemoryStore>) -> (Uuid, Uuid) {
    let author = engine.member("author").await;
    let fan = engine.member("fan").await;
    let post_id = engine.post(author).await;
    engine.settle().await;
    (fan, post_id)
}

/// Exercises the pipeline end to end under concurrent commands. The memory
/// store serializes transactions, so lost updates in the counter SQL are
/// only caught by the PostgreSQL variant.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_hundred_concurrent_hearts() {
    let engine = Arc::new(memory_engine());
    let author = engine.member("author").await;
    let post_id = engine.post(author).await;

    let mut members = Vec::new();
    for i in 0..100 {
        members.push(engine.member(&format!("fan{i}")).await);
    }

    let mut tasks = Vec::new();
    for member_id in members {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .handlers
                .posts
                .add_heart(post_id, member_id, &engine.ctx)
                .await
        }));
    }
    for task in tasks {
        assert!(assert_ok!(task.await.unwrap()));
    }
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    let post = tx.find_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.heart_count(), 100);
    assert_eq!(tx.count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rolled_back_work_dispatches_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::<MemoryTransaction>::new();
    registry
        .register(
            EventKind::PostCreated,
            Arc::new(Probe {
                calls: calls.clone(),
            }),
        )
        .unwrap();
    let engine = Engine::with_registry(MemoryStore::new(), registry, fast_dispatch());

    let mut uow = engine.dispatcher.begin(engine.ctx.clone()).await.unwrap();
    uow.publish(DomainEvent::PostCreated {
        post_id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
    });
    uow.rollback().await.unwrap();

    // A unit of work dropped without commit behaves the same
    {
        let mut uow = engine.dispatcher.begin(engine.ctx.clone()).await.unwrap();
        uow.publish(DomainEvent::PostCreated {
            post_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
        });
    }

    engine.settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let mut uow = engine.dispatcher.begin(engine.ctx.clone()).await.unwrap();
    uow.publish(DomainEvent::PostCreated {
        post_id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
    });
    uow.commit().await.unwrap();
    engine.settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_handler_does_not_block_others() {
    let registry = heart_registry(Arc::new(Exploding));
    let engine = Engine::with_registry(MemoryStore::new(), registry, fast_dispatch());
    let (fan, post_id) = seed(&engine).await;

    let added = engine.handlers.posts.add_heart(post_id, fan, &engine.ctx).await;
    assert!(added.unwrap());
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    let post = tx.find_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.heart_count(), 1);
    // The failing handler's increment was rolled back with its unit of work
    assert_eq!(post.view_count(), 0);

    let dead_letters = tx.list_dead_letters(10).await.unwrap();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].handler, "exploding");
    assert_eq!(dead_letters[0].event_type, "PostHeartAdded");
    assert_eq!(dead_letters[0].attempts, 2);
    assert!(dead_letters[0].error.contains("boom"));
    assert_eq!(tx.count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_stuck_handler_times_out() {
    let config = DispatchConfig {
        handler_timeout: Duration::from_millis(50),
        max_attempts: 1,
        ..fast_dispatch()
    };
    // Alone: in the memory store a stuck unit of work holds the store lock
    let mut registry = HandlerRegistry::<MemoryTransaction>::new();
    registry.register(EventKind::PostHeartAdded, Arc::new(Stuck)).unwrap();
    let engine = Engine::with_registry(MemoryStore::new(), registry, config);
    let (fan, post_id) = seed(&engine).await;

    engine.handlers.posts.add_heart(post_id, fan, &engine.ctx).await.unwrap();
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    assert_eq!(tx.count_pending().await.unwrap(), 0);
    let dead_letters = tx.list_dead_letters(10).await.unwrap();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].handler, "stuck");
    assert!(dead_letters[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let engine = Engine::with_registry(
        MemoryStore::new(),
        heart_registry(Arc::new(Panicking)),
        fast_dispatch(),
    );
    let (fan, post_id) = seed(&engine).await;

    engine.handlers.posts.add_heart(post_id, fan, &engine.ctx).await.unwrap();
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    assert_eq!(tx.find_post(post_id).await.unwrap().unwrap().heart_count(), 1);
    assert_eq!(tx.count_pending().await.unwrap(), 0);

    // A panic is a failed attempt: retried, then dead-lettered
    let dead_letters = tx.list_dead_letters(10).await.unwrap();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].handler, "panicking");
    assert_eq!(dead_letters[0].attempts, fast_dispatch().max_attempts as i32);
    assert!(dead_letters[0].error.contains("handler bug"));
}

#[tokio::test]
async fn test_redelivered_event_is_applied_once() {
    let engine = memory_engine();
    let (fan, post_id) = seed(&engine).await;

    let envelope = {
        let mut uow = engine.dispatcher.begin(engine.ctx.clone()).await.unwrap();
        uow.publish(DomainEvent::PostHeartAdded {
            post_id,
            member_id: fan,
        });
        let envelope = uow.pending().envelopes()[0].clone();
        uow.commit().await.unwrap();
        envelope
    };
    engine.settle().await;

    // The relay hands the same envelope over again, twice
    engine.executor.submit(vec![envelope.clone()]);
    engine.settle().await;
    engine.executor.submit(vec![envelope]);
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    assert_eq!(tx.find_post(post_id).await.unwrap().unwrap().heart_count(), 1);
}

#[tokio::test]
async fn test_follow_unfollow_counts() {
    let engine = memory_engine();
    let alice = engine.member("alice").await;
    let bob = engine.member("bob").await;

    engine.handlers.follows.follow(alice, bob, &engine.ctx).await.unwrap();
    engine.settle().await;
    {
        let mut tx = engine.store.begin().await.unwrap();
        assert_eq!(tx.find_member(bob).await.unwrap().unwrap().followers_count(), 1);
        assert_eq!(tx.find_member(alice).await.unwrap().unwrap().followings_count(), 1);
    }

    engine.handlers.follows.unfollow(alice, bob, &engine.ctx).await.unwrap();
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    assert_eq!(tx.find_member(bob).await.unwrap().unwrap().followers_count(), 0);
    assert_eq!(tx.find_member(alice).await.unwrap().unwrap().followings_count(), 0);
}

#[tokio::test]
async fn test_comment_delete_at_zero_stays_zero() {
    let engine = memory_engine();
    let (_, post_id) = seed(&engine).await;

    let mut uow = engine.dispatcher.begin(engine.ctx.clone()).await.unwrap();
    uow.publish(DomainEvent::CommentDeleted {
        comment_id: Uuid::new_v4(),
        post_id,
        parent_comment_id: None,
        author_id: Uuid::new_v4(),
    });
    uow.commit().await.unwrap();
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    assert_eq!(tx.find_post(post_id).await.unwrap().unwrap().comment_count(), 0);
    assert!(tx.list_dead_letters(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_relay_ignores_event_still_being_delivered() {
    let config = DispatchConfig {
        max_attempts: 3,
        retry_backoff: Duration::from_millis(200),
        ..fast_dispatch()
    };
    let mut registry = HandlerRegistry::<MemoryTransaction>::new();
    registry.register(EventKind::PostCreated, Arc::new(Failing)).unwrap();
    let engine = Engine::with_registry(MemoryStore::new(), registry, config);

    let mut uow = engine.dispatcher.begin(engine.ctx.clone()).await.unwrap();
    uow.publish(DomainEvent::PostCreated {
        post_id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
    });
    uow.commit().await.unwrap();

    // The row is still undispatched while the handler sits in backoff
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let found = relay_outbox(&engine.store, &engine.executor, Duration::ZERO, 100)
            .await
            .unwrap();
        assert_eq!(found, 1);
        assert_eq!(engine.executor.in_flight(), 1);
    }
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    let dead_letters = tx.list_dead_letters(10).await.unwrap();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].handler, "failing");
    assert_eq!(dead_letters[0].attempts, 3);
    assert_eq!(tx.count_pending().await.unwrap(), 0);
}
