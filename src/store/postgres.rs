//! PostgreSQL Store
//!
//! sqlx adapter for the persistence surface. Each [`PgTransaction`] wraps
//! one database transaction; counter changes are the single statements from
//! the counter catalogue, never read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::aggregate::{
    Aggregate, Collection, CollectionRecord, Comment, CommentRecord, Follow, FollowRecord,
    Friendship, FriendshipRecord, Member, MemberRecord, Post, PostRecord,
};
use crate::counters::{Counter, CounterMaterializer, DerivedCounter};
use crate::domain::EventEnvelope;

use super::{
    CollectionRepository, CommentRepository, DeadLetter, DeadLetterRepository, FollowRepository,
    FriendshipRepository, HandlerLedger, HeartRepository, MemberRepository, OutboxRepository,
    PostRepository, SaveAggregate, Store, StoreError, Transaction,
};

type MemberRow = (
    Uuid,
    String,
    String,
    Option<Uuid>,
    Option<String>,
    String,
    i64,
    i64,
    i64,
    i64,
    i64,
    DateTime<Utc>,
);

type PostRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    i64,
    DateTime<Utc>,
);

type CommentRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    Option<Uuid>,
    Option<Uuid>,
    String,
    String,
    i64,
    i64,
    DateTime<Utc>,
);

type FollowRow = (Uuid, Uuid, Uuid, String, i64, DateTime<Utc>);

type FriendshipRow = (Uuid, Uuid, Uuid, String, i64, DateTime<Utc>);

type DeadLetterRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    i32,
    serde_json::Value,
    DateTime<Utc>,
);

const MEMBER_COLUMNS: &str = "id, email, nickname, image_id, introduction, status, \
    followers_count, followings_count, post_count, friend_count, version, created_at";

const POST_COLUMNS: &str = "id, author_id, author_nickname, restaurant_name, content, status, \
    heart_count, view_count, comment_count, collected_count, version, created_at";

const COMMENT_COLUMNS: &str = "id, post_id, author_id, author_nickname, parent_comment_id, \
    parent_author_id, content, status, reply_count, version, created_at";

const FOLLOW_COLUMNS: &str = "id, follower_id, following_id, status, version, created_at";

const FRIENDSHIP_COLUMNS: &str = "id, member_id, friend_member_id, status, version, created_at";

fn member_from_row(row: MemberRow) -> Result<Member, StoreError> {
    let (
        id,
        email,
        nickname,
        image_id,
        introduction,
        status,
        followers_count,
        followings_count,
        post_count,
        friend_count,
        version,
        created_at,
    ) = row;
    Ok(Member::from_record(MemberRecord {
        id,
        email,
        nickname,
        image_id,
        introduction,
        status: status.parse()?,
        followers_count,
        followings_count,
        post_count,
        friend_count,
        version,
        created_at,
    }))
}

fn post_from_row(row: PostRow) -> Result<Post, StoreError> {
    let (
        id,
        author_id,
        author_nickname,
        restaurant_name,
        content,
        status,
        heart_count,
        view_count,
        comment_count,
        collected_count,
        version,
        created_at,
    ) = row;
    Ok(Post::from_record(PostRecord {
        id,
        author_id,
        author_nickname,
        restaurant_name,
        content,
        status: status.parse()?,
        heart_count,
        view_count,
        comment_count,
        collected_count,
        version,
        created_at,
    }))
}

fn comment_from_row(row: CommentRow) -> Result<Comment, StoreError> {
    let (
        id,
        post_id,
        author_id,
        author_nickname,
        parent_comment_id,
        parent_author_id,
        content,
        status,
        reply_count,
        version,
        created_at,
    ) = row;
    Ok(Comment::from_record(CommentRecord {
        id,
        post_id,
        author_id,
        author_nickname,
        parent_comment_id,
        parent_author_id,
        content,
        status: status.parse()?,
        reply_count,
        version,
        created_at,
    }))
}

fn follow_from_row(row: FollowRow) -> Result<Follow, StoreError> {
    let (id, follower_id, following_id, status, version, created_at) = row;
    Ok(Follow::from_record(FollowRecord {
        id,
        follower_id,
        following_id,
        status: status.parse()?,
        version,
        created_at,
    }))
}

fn friendship_from_row(row: FriendshipRow) -> Result<Friendship, StoreError> {
    let (id, member_id, friend_member_id, status, version, created_at) = row;
    Ok(Friendship::from_record(FriendshipRecord {
        id,
        member_id,
        friend_member_id,
        status: status.parse()?,
        version,
        created_at,
    }))
}

/// Map unique violations (SQLSTATE 23505) to [`StoreError::DuplicateKey`]
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateKey(db_err.constraint().unwrap_or("unique").to_string());
        }
    }
    StoreError::Database(err)
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(PgTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// One database transaction; dropped without commit it rolls back
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    /// Called when a version-checked update matched no row
    async fn stale_or_missing(
        &mut self,
        table: &'static str,
        aggregate: &'static str,
        id: Uuid,
        expected: i64,
    ) -> StoreError {
        let sql = format!("SELECT version FROM {table} WHERE id = $1");
        let current: Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await;

        match current {
            Ok(Some(actual)) => StoreError::ConcurrencyConflict {
                aggregate_id: id,
                expected,
                actual,
            },
            Ok(None) => StoreError::NotFound { aggregate, id },
            Err(e) => StoreError::Database(e),
        }
    }

    async fn apply_versioned(
        &mut self,
        rows_affected: u64,
        table: &'static str,
        aggregate: &'static str,
        id: Uuid,
        expected: i64,
    ) -> Result<i64, StoreError> {
        if rows_affected == 0 {
            return Err(self.stale_or_missing(table, aggregate, id, expected).await);
        }
        Ok(expected + 1)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_write_error)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =========================================================================
// Aggregate saves
// =========================================================================

#[async_trait]
impl SaveAggregate<Member> for PgTransaction {
    async fn save(&mut self, member: &mut Member) -> Result<(), StoreError> {
        let record = member.record().clone();

        let version = if member.is_new() {
            sqlx::query(
                r#"
                INSERT INTO members (id, email, nickname, image_id, introduction, status, version, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, 1, $7)
                "#,
            )
            .bind(record.id)
            .bind(&record.email)
            .bind(&record.nickname)
            .bind(record.image_id)
            .bind(&record.introduction)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            1
        } else {
            let rows = sqlx::query(
                r#"
                UPDATE members
                SET nickname = $2, image_id = $3, introduction = $4, status = $5,
                    version = version + 1
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(record.id)
            .bind(&record.nickname)
            .bind(record.image_id)
            .bind(&record.introduction)
            .bind(record.status.as_str())
            .bind(record.version)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?
            .rows_affected();
            self.apply_versioned(rows, "members", Member::aggregate_type(), record.id, record.version)
                .await?
        };

        member.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Post> for PgTransaction {
    async fn save(&mut self, post: &mut Post) -> Result<(), StoreError> {
        let record = post.record().clone();

        let version = if post.is_new() {
            sqlx::query(
                r#"
                INSERT INTO posts (id, author_id, author_nickname, restaurant_name, content, status, version, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, 1, $7)
                "#,
            )
            .bind(record.id)
            .bind(record.author_id)
            .bind(&record.author_nickname)
            .bind(&record.restaurant_name)
            .bind(&record.content)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            1
        } else {
            let rows = sqlx::query(
                r#"
                UPDATE posts
                SET restaurant_name = $2, content = $3, status = $4, version = version + 1
                WHERE id = $1 AND version = $5
                "#,
            )
            .bind(record.id)
            .bind(&record.restaurant_name)
            .bind(&record.content)
            .bind(record.status.as_str())
            .bind(record.version)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
            self.apply_versioned(rows, "posts", Post::aggregate_type(), record.id, record.version)
                .await?
        };

        post.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Comment> for PgTransaction {
    async fn save(&mut self, comment: &mut Comment) -> Result<(), StoreError> {
        let record = comment.record().clone();

        let version = if comment.is_new() {
            sqlx::query(
                r#"
                INSERT INTO comments (
                    id, post_id, author_id, author_nickname, parent_comment_id,
                    parent_author_id, content, status, version, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9)
                "#,
            )
            .bind(record.id)
            .bind(record.post_id)
            .bind(record.author_id)
            .bind(&record.author_nickname)
            .bind(record.parent_comment_id)
            .bind(record.parent_author_id)
            .bind(&record.content)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            1
        } else {
            let rows = sqlx::query(
                r#"
                UPDATE comments
                SET content = $2, status = $3, version = version + 1
                WHERE id = $1 AND version = $4
                "#,
            )
            .bind(record.id)
            .bind(&record.content)
            .bind(record.status.as_str())
            .bind(record.version)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
            self.apply_versioned(rows, "comments", Comment::aggregate_type(), record.id, record.version)
                .await?
        };

        comment.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Follow> for PgTransaction {
    async fn save(&mut self, follow: &mut Follow) -> Result<(), StoreError> {
        let record = follow.record().clone();

        let version = if follow.is_new() {
            sqlx::query(
                r#"
                INSERT INTO follows (id, follower_id, following_id, status, version, created_at)
                VALUES ($1, $2, $3, $4, 1, $5)
                "#,
            )
            .bind(record.id)
            .bind(record.follower_id)
            .bind(record.following_id)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            1
        } else {
            let rows = sqlx::query(
                r#"
                UPDATE follows
                SET status = $2, version = version + 1
                WHERE id = $1 AND version = $3
                "#,
            )
            .bind(record.id)
            .bind(record.status.as_str())
            .bind(record.version)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
            self.apply_versioned(rows, "follows", Follow::aggregate_type(), record.id, record.version)
                .await?
        };

        follow.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Friendship> for PgTransaction {
    async fn save(&mut self, friendship: &mut Friendship) -> Result<(), StoreError> {
        let record = friendship.record().clone();

        let version = if friendship.is_new() {
            sqlx::query(
                r#"
                INSERT INTO friendships (id, member_id, friend_member_id, status, version, created_at)
                VALUES ($1, $2, $3, $4, 1, $5)
                "#,
            )
            .bind(record.id)
            .bind(record.member_id)
            .bind(record.friend_member_id)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            1
        } else {
            let rows = sqlx::query(
                r#"
                UPDATE friendships
                SET status = $2, version = version + 1
                WHERE id = $1 AND version = $3
                "#,
            )
            .bind(record.id)
            .bind(record.status.as_str())
            .bind(record.version)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?
            .rows_affected();
            self.apply_versioned(
                rows,
                "friendships",
                Friendship::aggregate_type(),
                record.id,
                record.version,
            )
            .await?
        };

        friendship.mark_persisted(version);
        Ok(())
    }
}

#[async_trait]
impl SaveAggregate<Collection> for PgTransaction {
    async fn save(&mut self, collection: &mut Collection) -> Result<(), StoreError> {
        let record = collection.record().clone();

        let version = if collection.is_new() {
            sqlx::query(
                r#"
                INSERT INTO collections (id, owner_id, name, status, version, created_at)
                VALUES ($1, $2, $3, $4, 1, $5)
                "#,
            )
            .bind(record.id)
            .bind(record.owner_id)
            .bind(&record.name)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            1
        } else {
            let rows = sqlx::query(
                r#"
                UPDATE collections
                SET name = $2, status = $3, version = version + 1
                WHERE id = $1 AND version = $4
                "#,
            )
            .bind(record.id)
            .bind(&record.name)
            .bind(record.status.as_str())
            .bind(record.version)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
            self.apply_versioned(
                rows,
                "collections",
                Collection::aggregate_type(),
                record.id,
                record.version,
            )
            .await?
        };

        // Membership follows the aggregate's post set
        let post_ids: Vec<Uuid> = record.post_ids.iter().copied().collect();
        sqlx::query(
            r#"
            DELETE FROM collection_posts
            WHERE collection_id = $1 AND NOT (post_id = ANY($2))
            "#,
        )
        .bind(record.id)
        .bind(&post_ids)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO collection_posts (collection_id, post_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&post_ids)
        .execute(&mut *self.tx)
        .await?;

        collection.mark_persisted(version);
        Ok(())
    }
}

// =========================================================================
// Repositories
// =========================================================================

#[async_trait]
impl MemberRepository for PgTransaction {
    async fn find_member(&mut self, id: Uuid) -> Result<Option<Member>, StoreError> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1");
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(member_from_row).transpose()
    }
}

#[async_trait]
impl PostRepository for PgTransaction {
    async fn find_post(&mut self, id: Uuid) -> Result<Option<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(post_from_row).transpose()
    }

    async fn rename_post_author(
        &mut self,
        author_id: Uuid,
        nickname: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE posts SET author_nickname = $2 WHERE author_id = $1")
            .bind(author_id)
            .bind(nickname)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CommentRepository for PgTransaction {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>, StoreError> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        let row: Option<CommentRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(comment_from_row).transpose()
    }

    async fn rename_comment_author(
        &mut self,
        author_id: Uuid,
        nickname: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE comments SET author_nickname = $2 WHERE author_id = $1")
            .bind(author_id)
            .bind(nickname)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FollowRepository for PgTransaction {
    async fn find_follow(&mut self, id: Uuid) -> Result<Option<Follow>, StoreError> {
        let sql = format!("SELECT {FOLLOW_COLUMNS} FROM follows WHERE id = $1");
        let row: Option<FollowRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(follow_from_row).transpose()
    }

    async fn find_follow_between(
        &mut self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>, StoreError> {
        let sql = format!(
            "SELECT {FOLLOW_COLUMNS} FROM follows WHERE follower_id = $1 AND following_id = $2"
        );
        let row: Option<FollowRow> = sqlx::query_as(&sql)
            .bind(follower_id)
            .bind(following_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(follow_from_row).transpose()
    }
}

#[async_trait]
impl FriendshipRepository for PgTransaction {
    async fn find_friendship(&mut self, id: Uuid) -> Result<Option<Friendship>, StoreError> {
        let sql = format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE id = $1");
        let row: Option<FriendshipRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(friendship_from_row).transpose()
    }

    async fn find_open_friendship(
        &mut self,
        member_id: Uuid,
        friend_member_id: Uuid,
    ) -> Result<Option<Friendship>, StoreError> {
        let sql = format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships \
             WHERE member_id = $1 AND friend_member_id = $2 \
             AND status IN ('PENDING', 'ACCEPTED')"
        );
        let row: Option<FriendshipRow> = sqlx::query_as(&sql)
            .bind(member_id)
            .bind(friend_member_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(friendship_from_row).transpose()
    }

    async fn count_mutual_friends(&mut self, member_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM friendships f
            WHERE f.member_id = $1 AND f.status = 'ACCEPTED'
              AND EXISTS (
                  SELECT 1 FROM friendships m
                  WHERE m.member_id = f.friend_member_id
                    AND m.friend_member_id = $1
                    AND m.status = 'ACCEPTED'
              )
            "#,
        )
        .bind(member_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl CollectionRepository for PgTransaction {
    async fn find_collection(&mut self, id: Uuid) -> Result<Option<Collection>, StoreError> {
        let row: Option<(Uuid, Uuid, String, String, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, owner_id, name, status, version, created_at
            FROM collections
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some((id, owner_id, name, status, version, created_at)) = row else {
            return Ok(None);
        };

        let post_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT post_id FROM collection_posts WHERE collection_id = $1")
                .bind(id)
                .fetch_all(&mut *self.tx)
                .await?;

        Ok(Some(Collection::from_record(CollectionRecord {
            id,
            owner_id,
            name,
            status: status.parse()?,
            post_ids: post_ids.into_iter().collect(),
            version,
            created_at,
        })))
    }
}

#[async_trait]
impl HeartRepository for PgTransaction {
    async fn has_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM post_hearts WHERE post_id = $1 AND member_id = $2)",
        )
        .bind(post_id)
        .bind(member_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO post_hearts (post_id, member_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(member_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_heart(&mut self, post_id: Uuid, member_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM post_hearts WHERE post_id = $1 AND member_id = $2")
            .bind(post_id)
            .bind(member_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CounterMaterializer for PgTransaction {
    async fn increment(&mut self, counter: Counter, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(counter.increment_sql())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement_floor_zero(
        &mut self,
        counter: Counter,
        id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(counter.decrement_sql())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn recompute(&mut self, counter: DerivedCounter, id: Uuid) -> Result<bool, StoreError> {
        let locked = sqlx::query(counter.lock_sql())
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        if locked.is_none() {
            return Ok(false);
        }

        let result = sqlx::query(counter.recompute_sql())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =========================================================================
// Outbox, ledger and dead letters
// =========================================================================

#[async_trait]
impl OutboxRepository for PgTransaction {
    async fn append_outbox(&mut self, envelopes: &[EventEnvelope]) -> Result<(), StoreError> {
        for envelope in envelopes {
            let payload = serde_json::to_value(&envelope.event)?;
            sqlx::query(
                r#"
                INSERT INTO event_outbox (event_id, event_type, payload, correlation_id, occurred_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(envelope.event_id)
            .bind(envelope.event.event_type())
            .bind(payload)
            .bind(envelope.correlation_id)
            .bind(envelope.occurred_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        }
        Ok(())
    }

    async fn pending_outbox(
        &mut self,
        occurred_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows: Vec<(Uuid, DateTime<Utc>, Option<Uuid>, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT event_id, occurred_at, correlation_id, payload
            FROM event_outbox
            WHERE dispatched_at IS NULL AND occurred_at <= $1
            ORDER BY occurred_at ASC
            LIMIT $2
            "#,
        )
        .bind(occurred_before)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|(event_id, occurred_at, correlation_id, payload)| {
                Ok(EventEnvelope {
                    event_id,
                    occurred_at,
                    correlation_id,
                    event: serde_json::from_value(payload)?,
                })
            })
            .collect()
    }

    async fn mark_dispatched(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE event_outbox
            SET dispatched_at = NOW()
            WHERE event_id = $1 AND dispatched_at IS NULL
            "#,
        )
        .bind(event_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_pending(&mut self) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE dispatched_at IS NULL")
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count)
    }

    async fn purge_dispatched(&mut self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM event_outbox WHERE dispatched_at < $1")
            .bind(before)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HandlerLedger for PgTransaction {
    async fn record_handler_run(
        &mut self,
        event_id: Uuid,
        handler: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, handler)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(handler)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_handler_runs(&mut self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < $1")
            .bind(before)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DeadLetterRepository for PgTransaction {
    async fn record_dead_letter(&mut self, dead_letter: &DeadLetter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (id, event_id, event_type, handler, error, attempts, payload, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(dead_letter.id)
        .bind(dead_letter.event_id)
        .bind(&dead_letter.event_type)
        .bind(&dead_letter.handler)
        .bind(&dead_letter.error)
        .bind(dead_letter.attempts)
        .bind(&dead_letter.payload)
        .bind(dead_letter.failed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_dead_letters(&mut self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, handler, error, attempts, payload, failed_at
            FROM dead_letters
            ORDER BY failed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, event_id, event_type, handler, error, attempts, payload, failed_at)| {
                    DeadLetter {
                        id,
                        event_id,
                        event_type,
                        handler,
                        error,
                        attempts,
                        payload,
                        failed_at,
                    }
                },
            )
            .collect())
    }
}
