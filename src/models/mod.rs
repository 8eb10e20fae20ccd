// Blog entities - rows owned by the entity store plus the inputs used to create them

pub mod comment;
pub mod follow;
pub mod group;
pub mod post;
pub mod user;

pub use comment::{Comment, NewComment};
pub use follow::Follow;
pub use group::{Group, GroupField, NewGroup};
pub use post::{NewPost, Post, PostField};
pub use user::{NewUser, User};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters of text shown when a post or comment is rendered as a string.
pub const PREVIEW_CHARS: usize = 15;

/// Every entity kind the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Group,
    Post,
    Comment,
    Follow,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Group => "group",
            EntityType::Post => "post",
            EntityType::Comment => "comment",
            EntityType::Follow => "follow",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityType::User => "users",
            EntityType::Group => "post_groups",
            EntityType::Post => "posts",
            EntityType::Comment => "comments",
            EntityType::Follow => "follows",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle naming a single row, used by generic store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: i64,
}

impl EntityRef {
    pub fn user(id: i64) -> Self {
        Self { entity_type: EntityType::User, id }
    }

    pub fn group(id: i64) -> Self {
        Self { entity_type: EntityType::Group, id }
    }

    pub fn post(id: i64) -> Self {
        Self { entity_type: EntityType::Post, id }
    }

    pub fn comment(id: i64) -> Self {
        Self { entity_type: EntityType::Comment, id }
    }

    pub fn follow(id: i64) -> Self {
        Self { entity_type: EntityType::Follow, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity_type, self.id)
    }
}

/// Timestamps are stored as milliseconds since the epoch.
pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub(crate) fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_counts_characters() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("Тестовый пост длиннее пятнадцати"), "Тестовый пост д");
    }

    #[test]
    fn test_millis_round_trip() {
        let now = current_time_millis();
        assert_eq!(millis_to_datetime(now).timestamp_millis(), now);
    }
}
