//! In-memory Store
//!
//! A process-local store with the same transactional contract as the
//! PostgreSQL adapter. A transaction holds the table lock from `begin` until
//! it finishes, so transactions are serialized; rollback (or dropping an
//! unfinished transaction) restores the snapshot taken at `begin`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::aggregate::{
    Aggregate, Collection, CollectionRecord, Comment, CommentRecord, Follow, FollowRecord,
    FollowStatus, Friendship, FriendshipRecord, FriendshipStatus, Member, MemberRecord, Post,
    PostRecord,
};
use crate::counters::{Counter, CounterMaterializer, DerivedCounter};
use crate::domain::EventEnvelope;

use super::{
    CollectionRepository, CommentRepository, DeadLetter, DeadLetterRepository, FollowRepository,
    FriendshipRepository, HandlerLedger, HeartRepository, MemberRepository, OutboxRepository,
    PostRepository, SaveAggregate, Store, StoreError, Transaction,
};

#[derive(Debug, Clone)]
struct OutboxRow {
    envelope: EventEnvelope,
    dispatched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    members: HashMap<Uuid, MemberRecord>,
    posts: HashMap<Uuid, PostRecord>,
    comments: HashMap<Uuid, CommentRecord>,
    hearts: HashSet<(Uuid, Uuid)>,
    follows: HashMap<Uuid, FollowRecord>,
    friendships: HashMap<Uuid, FriendshipRecord>,
    collections: HashMap<Uuid, CollectionRecord>,
    outbox: Vec<OutboxRow>,
    handler_runs: HashMap<(Uuid, String), DateTime<Utc>>,
    dead_letters: Vec<DeadLetter>,
}

impl Tables {
    fn counter_mut(&mut self, counter: Counter, id: Uuid) -> Option<&mut i64> {
        match counter {
            Counter::PostHearts => self.posts.get_mut(&id).map(|p| &mut p.heart_count),
            Counter::PostViews => self.posts.get_mut(&id).map(|p| &mut p.view_count),
            Counter::PostComments => self.posts.get_mut(&id).map(|p| &mut p.comment_count),
            Counter::PostCollected => self.posts.get_mut(&id).map(|p| &mut p.collected_count),
            Counter::CommentReplies => self.comments.get_mut(&id).map(|c| &mut c.reply_count),
            Counter::MemberPosts => self.members.get_mut(&id).map(|m| &mut m.post_count),
        }
    }

    fn count_derived(&self, counter: DerivedCounter, member_id: Uuid) -> i64 {
        let count = match counter {
            DerivedCounter::MemberFollowers => self
                .follows
                .values()
                .filter(|f| f.following_id == member_id && f.status == FollowStatus::Active)
                .count(),
            DerivedCounter::MemberFollowings => self
                .follows
                .values()
                .filter(|f| f.follower_id == member_id && f.status == FollowStatus::Active)
                .count(),
            DerivedCounter::MemberFriends => self
                .friendships
                .values()
                .filter(|f| f.member_id == member_id && f.status == FriendshipStatus::Accepted)
                .count(),
        };
        count as i64
    }
}

/// Shared in-memory store; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryTransaction {
            guard: Some(guard),
            snapshot: Some(snapshot),
        })
    }
}

/// Unit of work over [`MemoryStore`]
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<Tables>>,
    snapshot: Option<Tables>,
}

impl MemoryTransaction {
    fn tables(&mut self) -> Result<&mut Tables, StoreError> {
        self.guard
            .as_deref_mut()
            .ok_or_else(|| StoreError::InvalidData("transaction already finished".to_string()))
    }

    fn restore(&mut self) {
        if let (Some(mut guard), Some(snapshot)) = (self.guard.take(), self.snapshot.take()) {
            *guard = snapshot;
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.restore();
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(mut self) -> Result<(), StoreError> {
        self.snapshot = None;
        self.guard = None;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.restore();
        Ok(())
    }
}

/// Version check shared by every save
fn check_version(
    aggregate_id: Uuid,
    expected: i64,
    stored: Option<i64>,
    aggregate: &'static str,
) -> Result<i64, StoreError> {
    match (expected, stored) {
        (0, None) => Ok(1),
        (0, Some(_)) => Err(StoreError::DuplicateKey(format!("{aggregate} {aggregate_id}"))),
        (_, None) => Err(StoreError::NotFound {
            aggregate,
            id: aggregate_id,
        }),
        (expected, Some(actual)) if expected != actual => Err(StoreError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }),
        (expected, Some(_)) => Ok(expected + 1),
    }
}

#[async_trait]
impl SaveAggregate<Member> for MemoryTransaction {
    async fn save(&mut self, member: &mut Member) -> Result<(), StoreError> {
        let tables = self.tables()?;
        let stored = tables.members.get(&member.id());
        let version = check_version(
            member.id(),
            member.version(),
            stored.map(|m| m.version),
            Member::aggregate_type(),
        )?;
        if member.is_new() && tables.members.values().any(|m| m.email == member.email()) {
            return Err(StoreError::DuplicateKey(format!("members.email {}", member.email())));
        }

        let mut row = member.record().clone();
        if let Some(stored) = stored {
            row.followers_count = stored.followers_count;
            row.followings_count = stored.followings_count;
            row.post_count = stored.post_count;
            row.friend_count = stored.friend_count;
        }
        row.version = version;
        tables.members.insert(row.id, row);
        member.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Post> for MemoryTransaction {
    async fn save(&mut self, post: &mut Post) -> Result<(), StoreError> {
        let tables = self.tables()?;
        let stored = tables.posts.get(&post.id());
        let version = check_version(
            post.id(),
            post.version(),
            stored.map(|p| p.version),
            Post::aggregate_type(),
        )?;

        let mut row = post.record().clone();
        if let Some(stored) = stored {
            row.author_nickname = stored.author_nickname.clone();
            row.heart_count = stored.heart_count;
            row.view_count = stored.view_count;
            row.comment_count = stored.comment_count;
            row.collected_count = stored.collected_count;
        }
        row.version = version;
        tables.posts.insert(row.id, row);
        post.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Comment> for MemoryTransaction {
    async fn save(&mut self, comment: &mut Comment) -> Result<(), StoreError> {
        let tables = self.tables()?;
        let stored = tables.comments.get(&comment.id());
        let version = check_version(
            comment.id(),
            comment.version(),
            stored.map(|c| c.version),
            Comment::aggregate_type(),
        )?;

        let mut row = comment.record().clone();
        if let Some(stored) = stored {
            row.author_nickname = stored.author_nickname.clone();
            row.reply_count = stored.reply_count;
        }
        row.version = version;
        tables.comments.insert(row.id, row);
        comment.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Follow> for MemoryTransaction {
    async fn save(&mut self, follow: &mut Follow) -> Result<(), StoreError> {
        let tables = self.tables()?;
        let version = check_version(
            follow.id(),
            follow.version(),
            tables.follows.get(&follow.id()).map(|f| f.version),
            Follow::aggregate_type(),
        )?;
        let pair_taken = tables.follows.values().any(|f| {
            f.id != follow.id()
                && f.follower_id == follow.follower_id()
                && f.following_id == follow.following_id()
        });
        if pair_taken {
            return Err(StoreError::DuplicateKey("follows (follower_id, following_id)".to_string()));
        }

        let mut row = follow.record().clone();
        row.version = version;
        tables.follows.insert(row.id, row);
        follow.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Friendship> for MemoryTransaction {
    async fn save(&mut self, friendship: &mut Friendship) -> Result<(), StoreError> {
        let tables = self.tables()?;
        let version = check_version(
            friendship.id(),
            friendship.version(),
            tables.friendships.get(&friendship.id()).map(|f| f.version),
            Friendship::aggregate_type(),
        )?;
        let open_pair_taken = friendship.status().is_open()
            && tables.friendships.values().any(|f| {
                f.id != friendship.id()
                    && f.member_id == friendship.member_id()
                    && f.friend_member_id == friendship.friend_member_id()
                    && f.status.is_open()
            });
        if open_pair_taken {
            return Err(StoreError::DuplicateKey(
                "friendships (member_id, friend_member_id) open".to_string(),
            ));
        }

        let mut row = friendship.record().clone();
        row.version = version;
        tables.friendships.insert(row.id, row);
        friendship.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Collection> for MemoryTransaction {
    async fn save(&mut self, collection: &mut Collection) -> Result<(), StoreError> {
        let tables = self.tables()?;
        let version = check_version(
            collection.id(),
            collection.version(),
            tables.collections.get(&collection.id()).map(|c| c.version),
            Collection::aggregate_type(),
        )?;

        let mut row = collection.record().clone();
        row.version = version;
        tables.collections.insert(row.id, row);
        collection.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl MemberRepository for MemoryTransaction {
    async fn find_member(&mut self, id: Uuid) -> Result<Option<Member>, StoreError> {
        Ok(self.tables()?.members.get(&id).cloned().map(Member::from_record))
    }
}

#[async_trait]
impl PostRepository for MemoryTransaction {
    async fn find_post(&mut self, id: Uuid) -> Result<Option<Post>, StoreError> {
        Ok(self.tables()?.posts.get(&id).cloned().map(Post::from_record))
    }

    async fn rename_post_author(
        &mut self,
        author_id: Uuid,
        nickname: &str,
    ) -> Result<u64, StoreError> {
        let mut updated = 0;
        for post in self.tables()?.posts.values_mut() {
            if post.author_id == author_id {
                post.author_nickname = nickname.to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl CommentRepository for MemoryTransaction {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>, StoreError> {
        Ok(self.tables()?.comments.get(&id).cloned().map(Comment::from_record))
    }

    async fn rename_comment_author(
        &mut self,
        author_id: Uuid,
        nickname: &str,
    ) -> Result<u64, StoreError> {
        let mut updated = 0;
        for comment in self.tables()?.comments.values_mut() {
            if comment.author_id == author_id {
                comment.author_nickname = nickname.to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl FollowRepository for MemoryTransaction {
    async fn find_follow(&mut self, id: Uuid) -> Result<Option<Follow>, StoreError> {
        Ok(self.tables()?.follows.get(&id).cloned().map(Follow::from_record))
    }

    async fn find_follow_between(
        &mut self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>, StoreError> {
        Ok(self
            .tables()?
            .follows
            .values()
            .find(|f| f.follower_id == follower_id && f.following_id == following_id)
            .cloned()
            .map(Follow::from_record))
    }
}

#[async_trait]
impl FriendshipRepository for MemoryTransaction {
    async fn find_friendship(&mut self, id: Uuid) -> Result<Option<Friendship>, StoreError> {
        Ok(self
            .tables()?
            .friendships
            .get(&id)
            .cloned()
            .map(Friendship::from_record))
    }

    async fn find_open_friendship(
        &mut self,
        member_id: Uuid,
        friend_member_id: Uuid,
    ) -> Result<Option<Friendship>, StoreError> {
        Ok(self
            .tables()?
            .friendships
            .values()
            .find(|f| {
                f.member_id == member_id
                    && f.friend_member_id == friend_member_id
                    && f.status.is_open()
            })
            .cloned()
            .map(Friendship::from_record))
    }

    async fn count_mutual_friends(&mut self, member_id: Uuid) -> Result<i64, StoreError> {
        let tables: &Tables = self.tables()?;
        let accepted = |from: Uuid, to: Uuid| {
            tables.friendships.values().any(|f| {
                f.member_id == from
                    && f.friend_member_id == to
                    && f.status == FriendshipStatus::Accepted
            })
        };
        let count = tables
            .friendships
            .values()
            .filter(|f| f.member_id == member_id && f.status == FriendshipStatus::Accepted)
            .filter(|f| accepted(f.friend_member_id, member_id))
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl CollectionRepository for MemoryTransaction {
    async fn find_collection(&mut self, id: Uuid) -> Result<Option<Collection>, StoreError> {
        Ok(self
            .tables()?
            .collections
            .get(&id)
            .cloned()
            .map(Collection::from_record))
    }
}

#[async_trait]
impl HeartRepository for MemoryTransaction {
    async fn has_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables()?.hearts.contains(&(post_id, member_id)))
    }

    async fn insert_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables()?.hearts.insert((post_id, member_id)))
    }

    async fn delete_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables()?.hearts.remove(&(post_id, member_id)))
    }
}

#[async_trait]
impl CounterMaterializer for MemoryTransaction {
    async fn increment(&mut self, counter: Counter, id: Uuid) -> Result<bool, StoreError> {
        match self.tables()?.counter_mut(counter, id) {
            Some(value) => {
                *value += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn decrement_floor_zero(
        &mut self,
        counter: Counter,
        id: Uuid,
    ) -> Result<bool, StoreError> {
        match self.tables()?.counter_mut(counter, id) {
            Some(value) if *value > 0 => {
                *value -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recompute(&mut self, counter: DerivedCounter, id: Uuid) -> Result<bool, StoreError> {
        let tables = self.tables()?;
        let count = tables.count_derived(counter, id);
        let Some(member) = tables.members.get_mut(&id) else {
            return Ok(false);
        };
        match counter {
            DerivedCounter::MemberFollowers => member.followers_count = count,
            DerivedCounter::MemberFollowings => member.followings_count = count,
            DerivedCounter::MemberFriends => member.friend_count = count,
        }
        Ok(true)
    }
}

#[async_trait]
impl OutboxRepository for MemoryTransaction {
    async fn append_outbox(&mut self, envelopes: &[EventEnvelope]) -> Result<(), StoreError> {
        let tables = self.tables()?;
        for envelope in envelopes {
            if tables.outbox.iter().any(|row| row.envelope.event_id == envelope.event_id) {
                return Err(StoreError::DuplicateKey(format!(
                    "event_outbox {}",
                    envelope.event_id
                )));
            }
            tables.outbox.push(OutboxRow {
                envelope: envelope.clone(),
                dispatched_at: None,
            });
        }
        Ok(())
    }

    async fn pending_outbox(
        &mut self,
        occurred_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let mut pending: Vec<EventEnvelope> = self
            .tables()?
            .outbox
            .iter()
            .filter(|row| row.dispatched_at.is_none())
            .filter(|row| row.envelope.occurred_at <= occurred_before)
            .map(|row| row.envelope.clone())
            .collect();
        pending.sort_by_key(|envelope| envelope.occurred_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_dispatched(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        let row = self
            .tables()?
            .outbox
            .iter_mut()
            .find(|row| row.envelope.event_id == event_id && row.dispatched_at.is_none());
        match row {
            Some(row) => {
                row.dispatched_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_pending(&mut self) -> Result<i64, StoreError> {
        let count = self
            .tables()?
            .outbox
            .iter()
            .filter(|row| row.dispatched_at.is_none())
            .count();
        Ok(count as i64)
    }

    async fn purge_dispatched(&mut self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let outbox = &mut self.tables()?.outbox;
        let initial = outbox.len();
        outbox.retain(|row| !matches!(row.dispatched_at, Some(at) if at < before));
        Ok((initial - outbox.len()) as u64)
    }
}

#[async_trait]
impl HandlerLedger for MemoryTransaction {
    async fn record_handler_run(
        &mut self,
        event_id: Uuid,
        handler: &str,
    ) -> Result<bool, StoreError> {
        let runs = &mut self.tables()?.handler_runs;
        let key = (event_id, handler.to_string());
        if runs.contains_key(&key) {
            return Ok(false);
        }
        runs.insert(key, Utc::now());
        Ok(true)
    }

    async fn purge_handler_runs(&mut self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let runs = &mut self.tables()?.handler_runs;
        let initial = runs.len();
        runs.retain(|_, processed_at| *processed_at >= before);
        Ok((initial - runs.len()) as u64)
    }
}

#[async_trait]
impl DeadLetterRepository for MemoryTransaction {
    async fn record_dead_letter(&mut self, dead_letter: &DeadLetter) -> Result<(), StoreError> {
        self.tables()?.dead_letters.push(dead_letter.clone());
        Ok(())
    }

    async fn list_dead_letters(&mut self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        Ok(self
            .tables()?
            .dead_letters
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_post(store: &MemoryStore) -> Post {
        let mut tx = store.begin().await.unwrap();
        let mut post = Post::create(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice".to_string(),
            "Eulji Myeonok".to_string(),
            "Pyongyang naengmyeon".to_string(),
        )
        .unwrap();
        tx.save(&mut post).await.unwrap();
        tx.commit().await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        let post = seed_post(&store).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.increment(Counter::PostHearts, post.id()).await.unwrap());
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let stored = tx.find_post(post.id()).await.unwrap().unwrap();
        assert_eq!(stored.heart_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let post = seed_post(&store).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_heart(post.id(), Uuid::new_v4()).await.unwrap();
            tx.increment(Counter::PostHearts, post.id()).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find_post(post.id()).await.unwrap().unwrap().heart_count(), 0);
    }

    #[tokio::test]
    async fn test_decrement_floor_zero_at_zero() {
        let store = MemoryStore::new();
        let post = seed_post(&store).await;

        let mut tx = store.begin().await.unwrap();
        let changed = tx
            .decrement_floor_zero(Counter::PostComments, post.id())
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(tx.find_post(post.id()).await.unwrap().unwrap().comment_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let store = MemoryStore::new();
        let post = seed_post(&store).await;

        let mut tx = store.begin().await.unwrap();
        let mut first = tx.find_post(post.id()).await.unwrap().unwrap();
        let mut second = first.clone();
        first.delete(first.author_id()).unwrap();
        tx.save(&mut first).await.unwrap();

        second.delete(second.author_id()).unwrap();
        let err = tx.save(&mut second).await.unwrap_err();
        assert!(err.is_concurrency_conflict());
    }

    #[tokio::test]
    async fn test_save_keeps_materialized_counters() {
        let store = MemoryStore::new();
        let post = seed_post(&store).await;

        let mut tx = store.begin().await.unwrap();
        let mut loaded = tx.find_post(post.id()).await.unwrap().unwrap();
        tx.increment(Counter::PostViews, post.id()).await.unwrap();
        loaded.delete(loaded.author_id()).unwrap();
        tx.save(&mut loaded).await.unwrap();

        let stored = tx.find_post(post.id()).await.unwrap().unwrap();
        assert_eq!(stored.view_count(), 1);
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn test_handler_run_recorded_once() {
        let store = MemoryStore::new();
        let event_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.record_handler_run(event_id, "heart_counter").await.unwrap());
        assert!(!tx.record_handler_run(event_id, "heart_counter").await.unwrap());
        assert!(tx.record_handler_run(event_id, "view_counter").await.unwrap());
    }
}
