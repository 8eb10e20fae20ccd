// Post - authored text, optionally filed under a group and carrying an image

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::preview;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    /// Joined from `users` for presentation.
    pub author_username: String,
    pub group_id: Option<i64>,
    /// Joined from `groups`; `None` whenever `group_id` is.
    pub group_slug: Option<String>,
    /// Attachment store reference.
    pub image: Option<String>,
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", preview(&self.text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub text: String,
    pub author_id: i64,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

impl NewPost {
    pub fn new(author_id: i64, text: &str) -> Self {
        Self {
            text: text.to_string(),
            author_id,
            group_id: None,
            image: None,
        }
    }

    pub fn group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn image(mut self, reference: &str) -> Self {
        self.image = Some(reference.to_string());
        self
    }
}

/// A single field assignment in a post update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostField {
    Text(String),
    Group(Option<i64>),
    Image(Option<String>),
    /// Always rejected; listed so callers get an explicit error instead of
    /// a silent no-op.
    CreatedAt(DateTime<Utc>),
}

impl PostField {
    pub fn name(&self) -> &'static str {
        match self {
            PostField::Text(_) => "text",
            PostField::Group(_) => "group_id",
            PostField::Image(_) => "image",
            PostField::CreatedAt(_) => "created_at",
        }
    }
}
