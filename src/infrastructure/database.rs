// Entity Store Interface - durable storage for users, groups, posts, comments
// and follows, with every constraint enforced inside the store operations

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{
    Comment, EntityRef, EntityType, Follow, Group, GroupField, NewComment, NewGroup, NewPost,
    NewUser, Post, PostField, User,
};

/// Which posts a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(i64),
    Author(i64),
    /// Posts whose author is followed by this user.
    FollowedBy(i64),
}

/// Both orders break `created_at` ties on `id` in the same direction, so a
/// listing is fully deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub filter: PostFilter,
    pub order: PostOrder,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PostQuery {
    pub fn new(filter: PostFilter) -> Self {
        Self {
            filter,
            order: PostOrder::NewestFirst,
            limit: None,
            offset: None,
        }
    }

    pub fn order(mut self, order: PostOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Entity store operations.
///
/// `find_*` calls are finite and restartable: each call issues a fresh query
/// and no cursor state is shared between calls.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // Users
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn get_user(&self, id: i64) -> AppResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>>;

    // Groups
    async fn create_group(&self, group: NewGroup) -> AppResult<Group>;
    async fn get_group(&self, id: i64) -> AppResult<Option<Group>>;
    async fn get_group_by_slug(&self, slug: &str) -> AppResult<Option<Group>>;
    async fn update_group(&self, id: i64, fields: Vec<GroupField>) -> AppResult<Group>;

    // Posts
    async fn create_post(&self, post: NewPost) -> AppResult<Post>;
    async fn get_post(&self, id: i64) -> AppResult<Option<Post>>;
    async fn update_post(&self, id: i64, fields: Vec<PostField>) -> AppResult<Post>;
    async fn find_posts(&self, query: &PostQuery) -> AppResult<Vec<Post>>;
    async fn count_posts(&self, filter: PostFilter) -> AppResult<usize>;

    // Comments
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;
    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>>;
    /// Oldest first.
    async fn find_comments_for_post(&self, post_id: i64) -> AppResult<Vec<Comment>>;

    // Follows
    /// Strict creation: an existing pair is a `ConstraintViolation`.
    async fn create_follow(&self, user_id: i64, author_id: i64) -> AppResult<Follow>;
    /// Create-if-absent. Returns whether a new edge was written.
    async fn follow_if_absent(&self, user_id: i64, author_id: i64) -> AppResult<bool>;
    /// Returns whether an edge was removed.
    async fn delete_follow(&self, user_id: i64, author_id: i64) -> AppResult<bool>;
    async fn follow_exists(&self, user_id: i64, author_id: i64) -> AppResult<bool>;
    /// Edges where `user_id` is the follower.
    async fn find_following(&self, user_id: i64) -> AppResult<Vec<Follow>>;
    /// Edges where `author_id` is the followed author.
    async fn find_followers(&self, author_id: i64) -> AppResult<Vec<Follow>>;

    // Generic operations
    /// Delete a row, resolving strong references by cascading and weak
    /// references by clearing them. Returns the attachment references of
    /// every post removed, or `None` if the row did not exist.
    async fn delete_collecting_attachments(&self, entity: EntityRef) -> AppResult<Option<Vec<String>>>;

    /// Returns false if the row did not exist.
    async fn delete(&self, entity: EntityRef) -> AppResult<bool> {
        Ok(self.delete_collecting_attachments(entity).await?.is_some())
    }
    async fn exists(&self, entity: EntityRef) -> AppResult<bool>;
    async fn count(&self, entity_type: EntityType) -> AppResult<usize>;
}
