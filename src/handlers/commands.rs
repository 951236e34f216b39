//! Command definitions
//!
//! Commands represent intentions to change the system state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::ProfileChanges;

// =========================================================================
// Members
// =========================================================================

/// Command to register a new member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMemberCommand {
    pub member_id: Uuid,
    pub email: String,
    pub nickname: String,
}

impl RegisterMemberCommand {
    pub fn new(email: String, nickname: String) -> Self {
        Self {
            member_id: Uuid::new_v4(),
            email,
            nickname,
        }
    }

    pub fn with_member_id(mut self, member_id: Uuid) -> Self {
        self.member_id = member_id;
        self
    }
}

/// Command to change a member's profile; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileCommand {
    pub member_id: Uuid,
    pub nickname: Option<String>,
    pub image_id: Option<Uuid>,
    pub introduction: Option<String>,
}

impl UpdateProfileCommand {
    pub fn new(member_id: Uuid) -> Self {
        Self {
            member_id,
            ..Default::default()
        }
    }

    pub fn with_nickname(mut self, nickname: String) -> Self {
        self.nickname = Some(nickname);
        self
    }

    pub fn with_image(mut self, image_id: Uuid) -> Self {
        self.image_id = Some(image_id);
        self
    }

    pub fn with_introduction(mut self, introduction: String) -> Self {
        self.introduction = Some(introduction);
        self
    }

    pub(crate) fn changes(&self) -> ProfileChanges {
        ProfileChanges {
            nickname: self.nickname.clone(),
            image_id: self.image_id,
            introduction: self.introduction.clone(),
        }
    }
}

// =========================================================================
// Posts and comments
// =========================================================================

/// Command to publish a restaurant review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostCommand {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub restaurant_name: String,
    pub content: String,
}

impl CreatePostCommand {
    pub fn new(author_id: Uuid, restaurant_name: String, content: String) -> Self {
        Self {
            post_id: Uuid::new_v4(),
            author_id,
            restaurant_name,
            content,
        }
    }
}

/// Command to comment on a post, or reply to a top-level comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentCommand {
    pub comment_id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

impl CreateCommentCommand {
    pub fn new(post_id: Uuid, author_id: Uuid, content: String) -> Self {
        Self {
            comment_id: Uuid::new_v4(),
            post_id,
            author_id,
            content,
            parent_comment_id: None,
        }
    }

    pub fn reply_to(mut self, parent_comment_id: Uuid) -> Self {
        self.parent_comment_id = Some(parent_comment_id);
        self
    }
}

// =========================================================================
// Collections
// =========================================================================

/// Command to create a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionCommand {
    pub collection_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
}

impl CreateCollectionCommand {
    pub fn new(owner_id: Uuid, name: String) -> Self {
        Self {
            collection_id: Uuid::new_v4(),
            owner_id,
            name,
        }
    }
}
