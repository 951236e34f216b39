//! Domain Events
//!
//! Immutable facts raised by aggregates. Every variant carries identifiers
//! only, never a snapshot of the aggregate it concerns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OperationContext;

/// Profile attributes that a `MemberProfileUpdated` event can report as changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Nickname,
    Image,
    Introduction,
}

/// Every fact the platform can raise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    MemberRegistered {
        member_id: Uuid,
    },

    MemberActivated {
        member_id: Uuid,
    },

    MemberDeactivated {
        member_id: Uuid,
    },

    MemberProfileUpdated {
        member_id: Uuid,
        updated_fields: Vec<ProfileField>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_nickname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_image_id: Option<Uuid>,
    },

    PostCreated {
        post_id: Uuid,
        author_id: Uuid,
    },

    PostDeleted {
        post_id: Uuid,
        author_id: Uuid,
    },

    PostHeartAdded {
        post_id: Uuid,
        member_id: Uuid,
    },

    PostHeartRemoved {
        post_id: Uuid,
        member_id: Uuid,
    },

    PostViewed {
        post_id: Uuid,
        viewer_id: Uuid,
        author_id: Uuid,
    },

    CommentCreated {
        comment_id: Uuid,
        post_id: Uuid,
        author_id: Uuid,
        #[serde(default)]
        parent_comment_id: Option<Uuid>,
        #[serde(default)]
        parent_author_id: Option<Uuid>,
    },

    CommentDeleted {
        comment_id: Uuid,
        post_id: Uuid,
        #[serde(default)]
        parent_comment_id: Option<Uuid>,
        author_id: Uuid,
    },

    FollowStarted {
        follow_id: Uuid,
        follower_id: Uuid,
        following_id: Uuid,
    },

    Unfollowed {
        follow_id: Uuid,
        follower_id: Uuid,
        following_id: Uuid,
    },

    FollowBlocked {
        follow_id: Uuid,
        follower_id: Uuid,
        following_id: Uuid,
    },

    FriendRequestSent {
        friendship_id: Uuid,
        from_id: Uuid,
        to_id: Uuid,
    },

    FriendRequestAccepted {
        friendship_id: Uuid,
        from_id: Uuid,
        to_id: Uuid,
    },

    FriendRequestRejected {
        friendship_id: Uuid,
        from_id: Uuid,
        to_id: Uuid,
    },

    FriendshipTerminated {
        member_id: Uuid,
        friend_member_id: Uuid,
    },

    CollectionCreated {
        collection_id: Uuid,
        owner_id: Uuid,
    },

    CollectionPostAdded {
        collection_id: Uuid,
        post_id: Uuid,
        owner_id: Uuid,
    },

    CollectionPostRemoved {
        collection_id: Uuid,
        post_id: Uuid,
        owner_id: Uuid,
    },

    /// Carries the ids of the posts still in the collection when it was deleted
    CollectionDeleted {
        collection_id: Uuid,
        owner_id: Uuid,
        post_ids: Vec<Uuid>,
    },
}

/// Discriminant of [`DomainEvent`], used as the handler registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MemberRegistered,
    MemberActivated,
    MemberDeactivated,
    MemberProfileUpdated,
    PostCreated,
    PostDeleted,
    PostHeartAdded,
    PostHeartRemoved,
    PostViewed,
    CommentCreated,
    CommentDeleted,
    FollowStarted,
    Unfollowed,
    FollowBlocked,
    FriendRequestSent,
    FriendRequestAccepted,
    FriendRequestRejected,
    FriendshipTerminated,
    CollectionCreated,
    CollectionPostAdded,
    CollectionPostRemoved,
    CollectionDeleted,
}

impl EventKind {
    /// Get the event type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MemberRegistered => "MemberRegistered",
            EventKind::MemberActivated => "MemberActivated",
            EventKind::MemberDeactivated => "MemberDeactivated",
            EventKind::MemberProfileUpdated => "MemberProfileUpdated",
            EventKind::PostCreated => "PostCreated",
            EventKind::PostDeleted => "PostDeleted",
            EventKind::PostHeartAdded => "PostHeartAdded",
            EventKind::PostHeartRemoved => "PostHeartRemoved",
            EventKind::PostViewed => "PostViewed",
            EventKind::CommentCreated => "CommentCreated",
            EventKind::CommentDeleted => "CommentDeleted",
            EventKind::FollowStarted => "FollowStarted",
            EventKind::Unfollowed => "Unfollowed",
            EventKind::FollowBlocked => "FollowBlocked",
            EventKind::FriendRequestSent => "FriendRequestSent",
            EventKind::FriendRequestAccepted => "FriendRequestAccepted",
            EventKind::FriendRequestRejected => "FriendRequestRejected",
            EventKind::FriendshipTerminated => "FriendshipTerminated",
            EventKind::CollectionCreated => "CollectionCreated",
            EventKind::CollectionPostAdded => "CollectionPostAdded",
            EventKind::CollectionPostRemoved => "CollectionPostRemoved",
            EventKind::CollectionDeleted => "CollectionDeleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::MemberRegistered { .. } => EventKind::MemberRegistered,
            DomainEvent::MemberActivated { .. } => EventKind::MemberActivated,
            DomainEvent::MemberDeactivated { .. } => EventKind::MemberDeactivated,
            DomainEvent::MemberProfileUpdated { .. } => EventKind::MemberProfileUpdated,
            DomainEvent::PostCreated { .. } => EventKind::PostCreated,
            DomainEvent::PostDeleted { .. } => EventKind::PostDeleted,
            DomainEvent::PostHeartAdded { .. } => EventKind::PostHeartAdded,
            DomainEvent::PostHeartRemoved { .. } => EventKind::PostHeartRemoved,
            DomainEvent::PostViewed { .. } => EventKind::PostViewed,
            DomainEvent::CommentCreated { .. } => EventKind::CommentCreated,
            DomainEvent::CommentDeleted { .. } => EventKind::CommentDeleted,
            DomainEvent::FollowStarted { .. } => EventKind::FollowStarted,
            DomainEvent::Unfollowed { .. } => EventKind::Unfollowed,
            DomainEvent::FollowBlocked { .. } => EventKind::FollowBlocked,
            DomainEvent::FriendRequestSent { .. } => EventKind::FriendRequestSent,
            DomainEvent::FriendRequestAccepted { .. } => EventKind::FriendRequestAccepted,
            DomainEvent::FriendRequestRejected { .. } => EventKind::FriendRequestRejected,
            DomainEvent::FriendshipTerminated { .. } => EventKind::FriendshipTerminated,
            DomainEvent::CollectionCreated { .. } => EventKind::CollectionCreated,
            DomainEvent::CollectionPostAdded { .. } => EventKind::CollectionPostAdded,
            DomainEvent::CollectionPostRemoved { .. } => EventKind::CollectionPostRemoved,
            DomainEvent::CollectionDeleted { .. } => EventKind::CollectionDeleted,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// A domain event together with its delivery metadata.
///
/// `event_id` is the identity used by the outbox and by the per-handler
/// idempotency ledger, so it is assigned once when the event is published
/// and never regenerated on redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub event: DomainEvent,
}

impl EventEnvelope {
    /// Wrap an event raised under the given operation context
    pub fn new(event: DomainEvent, context: &OperationContext) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            correlation_id: context.correlation_id,
            event,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}
