//! PostgreSQL integration tests
//!
//! Skipped unless DATABASE_URL points at a migrated database.

use std::sync::Arc;

use matzip::aggregate::Aggregate;
use matzip::store::{
    HandlerLedger, MemberRepository, PgStore, PostRepository, SaveAggregate, Store, StoreError,
    Transaction,
};
use uuid::Uuid;

mod common;

use common::Engine;

async fn engine() -> Option<Engine<PgStore>> {
    let pool = common::setup_test_db().await?;
    Some(Engine::standard(PgStore::new(pool)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_hearts_are_not_lost() {
    let Some(engine) = engine().await else {
        return;
    };
    let engine = Arc::new(engine);
    let author = engine.member("author").await;
    let post_id = engine.post(author).await;

    let mut fans = Vec::new();
    for i in 0..100 {
        fans.push(engine.member(&format!("fan{i}")).await);
    }

    let mut tasks = Vec::new();
    for fan in fans.iter().copied() {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.handlers.posts.add_heart(post_id, fan, &engine.ctx).await
        }));
    }
    // The same member hearting twice at once counts once
    for _ in 0..5 {
        let engine = engine.clone();
        let fan = fans[0];
        tasks.push(tokio::spawn(async move {
            engine.handlers.posts.add_heart(post_id, fan, &engine.ctx).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    let post = tx.find_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.heart_count(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_follows_recompute_to_final_count() {
    let Some(engine) = engine().await else {
        return;
    };
    let engine = Arc::new(engine);
    let star = engine.member("star").await;

    let mut followers = Vec::new();
    for i in 0..40 {
        followers.push(engine.member(&format!("follower{i}")).await);
    }

    let mut tasks = Vec::new();
    for follower in followers {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.handlers.follows.follow(follower, star, &engine.ctx).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    engine.settle().await;

    // Overlapping recomputes of one member must not write a stale count
    let mut tx = engine.store.begin().await.unwrap();
    let star_row = tx.find_member(star).await.unwrap().unwrap();
    assert_eq!(star_row.followers_count(), 40);
}

#[tokio::test]
async fn test_follow_and_friend_counters() {
    let Some(engine) = engine().await else {
        return;
    };
    let alice = engine.member("alice").await;
    let bob = engine.member("bob").await;

    engine.handlers.follows.follow(alice, bob, &engine.ctx).await.unwrap();
    let request = engine.handlers.friendships.request(alice, bob, &engine.ctx).await.unwrap();
    engine.handlers.friendships.accept(request, bob, &engine.ctx).await.unwrap();
    engine.settle().await;

    {
        let mut tx = engine.store.begin().await.unwrap();
        let alice_row = tx.find_member(alice).await.unwrap().unwrap();
        let bob_row = tx.find_member(bob).await.unwrap().unwrap();
        assert_eq!(bob_row.followers_count(), 1);
        assert_eq!(alice_row.followings_count(), 1);
        // No mirror row yet
        assert_eq!(alice_row.friend_count(), 1);
        assert_eq!(bob_row.friend_count(), 0);
        tx.rollback().await.unwrap();
    }

    engine.handlers.follows.unfollow(alice, bob, &engine.ctx).await.unwrap();
    engine.handlers.friendships.unfriend(bob, alice, &engine.ctx).await.unwrap();
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    let alice_row = tx.find_member(alice).await.unwrap().unwrap();
    assert_eq!(alice_row.followings_count(), 0);
    assert_eq!(alice_row.friend_count(), 0);
}

#[tokio::test]
async fn test_stale_save_is_rejected() {
    let Some(engine) = engine().await else {
        return;
    };
    let author = engine.member("author").await;
    let post_id = engine.post(author).await;
    engine.settle().await;

    let mut tx = engine.store.begin().await.unwrap();
    let mut first = tx.find_post(post_id).await.unwrap().unwrap();
    let mut second = first.clone();

    first.delete(author).unwrap();
    SaveAggregate::save(&mut tx, &mut first).await.unwrap();
    assert_eq!(first.version(), 2);

    second.delete(author).unwrap();
    let err = SaveAggregate::save(&mut tx, &mut second).await.unwrap_err();
    assert!(matches!(err, StoreError::ConcurrencyConflict { expected: 1, actual: 2, .. }));
}

#[tokio::test]
async fn test_handler_ledger_marks_once() {
    let Some(engine) = engine().await else {
        return;
    };
    let event_id = Uuid::new_v4();

    let mut tx = engine.store.begin().await.unwrap();
    assert!(tx.record_handler_run(event_id, "probe").await.unwrap());
    tx.commit().await.unwrap();

    let mut tx = engine.store.begin().await.unwrap();
    assert!(!tx.record_handler_run(event_id, "probe").await.unwrap());
    assert!(tx.record_handler_run(event_id, "other").await.unwrap());
    tx.rollback().await.unwrap();
}
