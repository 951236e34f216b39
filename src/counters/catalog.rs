//! Counter Catalogue
//!
//! Every denormalized counter, the row it lives on, and the single
//! statement that changes it.

use std::fmt;

/// Builds the increment / floor-zero decrement statements for one column
macro_rules! delta_sql {
    ($table:literal, $column:literal) => {
        (
            concat!(
                "UPDATE ", $table, " SET ", $column, " = ", $column, " + 1 WHERE id = $1"
            ),
            concat!(
                "UPDATE ", $table, " SET ", $column, " = ", $column,
                " - 1 WHERE id = $1 AND ", $column, " > 0"
            ),
        )
    };
}

/// Content counters, maintained by atomic +1 / -1 deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    PostHearts,
    PostViews,
    PostComments,
    PostCollected,
    CommentReplies,
    MemberPosts,
}

impl Counter {
    pub const ALL: [Counter; 6] = [
        Counter::PostHearts,
        Counter::PostViews,
        Counter::PostComments,
        Counter::PostCollected,
        Counter::CommentReplies,
        Counter::MemberPosts,
    ];

    /// Table holding the counter
    pub fn table(&self) -> &'static str {
        match self {
            Counter::PostHearts
            | Counter::PostViews
            | Counter::PostComments
            | Counter::PostCollected => "posts",
            Counter::CommentReplies => "comments",
            Counter::MemberPosts => "members",
        }
    }

    /// Column holding the counter
    pub fn column(&self) -> &'static str {
        match self {
            Counter::PostHearts => "heart_count",
            Counter::PostViews => "view_count",
            Counter::PostComments => "comment_count",
            Counter::PostCollected => "collected_count",
            Counter::CommentReplies => "reply_count",
            Counter::MemberPosts => "post_count",
        }
    }

    fn statements(&self) -> (&'static str, &'static str) {
        match self {
            Counter::PostHearts => delta_sql!("posts", "heart_count"),
            Counter::PostViews => delta_sql!("posts", "view_count"),
            Counter::PostComments => delta_sql!("posts", "comment_count"),
            Counter::PostCollected => delta_sql!("posts", "collected_count"),
            Counter::CommentReplies => delta_sql!("comments", "reply_count"),
            Counter::MemberPosts => delta_sql!("members", "post_count"),
        }
    }

    /// `SET c = c + 1`, bound to the row id as `$1`
    pub fn increment_sql(&self) -> &'static str {
        self.statements().0
    }

    /// `SET c = c - 1 ... AND c > 0`; matches no row when the counter is already 0
    pub fn decrement_sql(&self) -> &'static str {
        self.statements().1
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table(), self.column())
    }
}

/// Relationship counters, always recomputed from the relationship rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedCounter {
    /// ACTIVE follows pointing at the member
    MemberFollowers,
    /// ACTIVE follows made by the member
    MemberFollowings,
    /// ACCEPTED friendship rows owned by the member
    MemberFriends,
}

impl DerivedCounter {
    pub fn column(&self) -> &'static str {
        match self {
            DerivedCounter::MemberFollowers => "followers_count",
            DerivedCounter::MemberFollowings => "followings_count",
            DerivedCounter::MemberFriends => "friend_count",
        }
    }

    /// Row lock taken before [`recompute_sql`](Self::recompute_sql).
    ///
    /// Under READ COMMITTED an `UPDATE` blocked on the row keeps the count
    /// from its own start-of-statement snapshot. Locking first makes the
    /// recompute a separate statement whose snapshot includes every
    /// relationship row committed by the previous lock holder.
    pub fn lock_sql(&self) -> &'static str {
        "SELECT id FROM members WHERE id = $1 FOR UPDATE"
    }

    /// Overwrites the counter with the authoritative count
    pub fn recompute_sql(&self) -> &'static str {
        match self {
            DerivedCounter::MemberFollowers => {
                r#"
                UPDATE members
                SET followers_count = (
                    SELECT COUNT(*) FROM follows
                    WHERE following_id = $1 AND status = 'ACTIVE'
                )
                WHERE id = $1
                "#
            }
            DerivedCounter::MemberFollowings => {
                r#"
                UPDATE members
                SET followings_count = (
                    SELECT COUNT(*) FROM follows
                    WHERE follower_id = $1 AND status = 'ACTIVE'
                )
                WHERE id = $1
                "#
            }
            DerivedCounter::MemberFriends => {
                r#"
                UPDATE members
                SET friend_count = (
                    SELECT COUNT(*) FROM friendships
                    WHERE member_id = $1 AND status = 'ACCEPTED'
                )
                WHERE id = $1
                "#
            }
        }
    }
}

impl fmt::Display for DerivedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "members.{}", self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_is_single_statement_delta() {
        assert_eq!(
            Counter::PostHearts.increment_sql(),
            "UPDATE posts SET heart_count = heart_count + 1 WHERE id = $1"
        );
    }

    #[test]
    fn test_decrement_is_guarded_at_zero() {
        assert_eq!(
            Counter::CommentReplies.decrement_sql(),
            "UPDATE comments SET reply_count = reply_count - 1 WHERE id = $1 AND reply_count > 0"
        );
    }

    #[test]
    fn test_statements_match_table_and_column() {
        for counter in Counter::ALL {
            let prefix = format!("UPDATE {} SET {} = {}", counter.table(), counter.column(), counter.column());
            assert!(counter.increment_sql().starts_with(&prefix), "{counter}");
            assert!(counter.decrement_sql().starts_with(&prefix), "{counter}");
            assert!(counter.decrement_sql().ends_with(&format!("{} > 0", counter.column())));
        }
    }

    #[test]
    fn test_recompute_counts_authoritative_rows() {
        let sql = DerivedCounter::MemberFriends.recompute_sql();
        assert!(sql.contains("SET friend_count"));
        assert!(sql.contains("status = 'ACCEPTED'"));

        let sql = DerivedCounter::MemberFollowers.recompute_sql();
        assert!(sql.contains("following_id = $1 AND status = 'ACTIVE'"));
        assert_eq!(DerivedCounter::MemberFollowers.to_string(), "members.followers_count");
    }

    #[test]
    fn test_recompute_locks_member_row_separately() {
        for counter in [
            DerivedCounter::MemberFollowers,
            DerivedCounter::MemberFollowings,
            DerivedCounter::MemberFriends,
        ] {
            let lock = counter.lock_sql();
            assert!(lock.starts_with("SELECT"));
            assert!(lock.ends_with("FOR UPDATE"));
            // Separate statements, so the count is taken after the lock is held
            assert!(!counter.recompute_sql().contains("FOR UPDATE"));
        }
    }
}
