//! Aggregate module
//!
//! State machines that guard their own invariants and record a domain event
//! for every successful transition.

/// Implements `as_str`, `Display` and `FromStr` for a status enum stored as upper-case text
macro_rules! status_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::aggregate::UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::aggregate::UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use status_enum;

pub mod collection;
pub mod comment;
pub mod follow;
pub mod friendship;
pub mod member;
pub mod post;

pub use collection::{Collection, CollectionRecord, CollectionStatus};
pub use comment::{Comment, CommentRecord, CommentStatus};
pub use follow::{Follow, FollowRecord, FollowStatus};
pub use friendship::{Friendship, FriendshipRecord, FriendshipStatus};
pub use member::{Member, MemberRecord, MemberStatus, ProfileChanges};
pub use post::{Post, PostRecord, PostStatus};

use uuid::Uuid;

use crate::domain::DomainEvent;

/// Aggregate trait that all aggregates must implement
pub trait Aggregate: Send {
    /// Get the aggregate type name (for storage and errors)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> Uuid;

    /// Persisted row version, 0 for an aggregate that has never been saved
    fn version(&self) -> i64;

    /// Record the version the storage layer assigned on save
    fn mark_persisted(&mut self, version: i64);

    /// Drain the events recorded since the last call
    fn take_events(&mut self) -> Vec<DomainEvent>;

    /// Check whether this aggregate has never been persisted
    fn is_new(&self) -> bool {
        self.version() == 0
    }
}

/// Error for an unrecognised status string read back from storage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}
