// Post service - authoring, commenting, profiles and follow toggles on top
// of the entity store and attachment store

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::attachments::AttachmentStore;
use crate::infrastructure::database::{EntityStore, PostFilter};
use crate::infrastructure::viewer::ViewerContext;
use crate::models::{Comment, EntityRef, NewComment, NewPost, Post, PostField, User};
use crate::pagination::Page;
use crate::services::feed::FeedComposer;
use crate::validation;

/// Uploaded image payload, already decoded.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Post form contents, used for both creation and editing.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    pub group: Option<String>,
    /// On edit, `None` keeps the current image.
    pub image: Option<ImageUpload>,
}

impl PostDraft {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn group(mut self, slug: &str) -> Self {
        self.group = Some(slug.to_string());
        self
    }

    pub fn image(mut self, filename: &str, content: Vec<u8>) -> Self {
        self.image = Some(ImageUpload {
            filename: filename.to_string(),
            content,
        });
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    /// Oldest first.
    pub comments: Vec<Comment>,
    pub author_post_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub author: User,
    pub posts: Page<Post>,
    pub post_count: usize,
    pub following: bool,
}

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn EntityStore>,
    attachments: Arc<dyn AttachmentStore>,
    feeds: FeedComposer,
}

impl PostService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        attachments: Arc<dyn AttachmentStore>,
        feeds: FeedComposer,
    ) -> Self {
        Self {
            store,
            attachments,
            feeds,
        }
    }

    #[instrument(skip(self, viewer, draft), fields(request_id = %viewer.request_id))]
    pub async fn create_post(&self, viewer: &ViewerContext, draft: PostDraft) -> AppResult<Post> {
        let author = viewer.require_user()?;
        validation::validate_post_text(&draft.text)?;
        let group_id = self.resolve_group(draft.group.as_deref()).await?;

        let mut new_post = NewPost::new(author.id, &draft.text);
        if let Some(group_id) = group_id {
            new_post = new_post.group(group_id);
        }

        let image = self.store_image(draft.image.as_ref()).await?;
        if let Some(reference) = &image {
            new_post = new_post.image(reference);
        }

        match self.store.create_post(new_post).await {
            Ok(post) => {
                info!(post_id = post.id, author = %author, "Created post");
                Ok(post)
            }
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                Err(err)
            }
        }
    }

    /// Author-only. Text and group are replaced; the image only when a new
    /// one is supplied.
    #[instrument(skip(self, viewer, draft), fields(request_id = %viewer.request_id))]
    pub async fn edit_post(&self, viewer: &ViewerContext, post_id: i64, draft: PostDraft) -> AppResult<Post> {
        let editor = viewer.require_user()?;
        let post = self.get_post(post_id).await?;
        if post.author_id != editor.id {
            return Err(AppError::Forbidden(format!(
                "{} is not the author of post {}",
                editor, post_id
            )));
        }
        validation::validate_post_text(&draft.text)?;
        let group_id = self.resolve_group(draft.group.as_deref()).await?;

        let mut fields = vec![PostField::Text(draft.text), PostField::Group(group_id)];
        let image = self.store_image(draft.image.as_ref()).await?;
        if let Some(reference) = &image {
            fields.push(PostField::Image(Some(reference.clone())));
        }

        match self.store.update_post(post_id, fields).await {
            Ok(updated) => {
                if image.is_some() {
                    self.discard_image(post.image.as_deref()).await;
                }
                info!(post_id, "Edited post");
                Ok(updated)
            }
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn post_detail(&self, post_id: i64) -> AppResult<PostDetail> {
        let post = self.get_post(post_id).await?;
        let (comments, author_post_count) = futures::try_join!(
            self.store.find_comments_for_post(post_id),
            self.store.count_posts(PostFilter::Author(post.author_id)),
        )?;

        Ok(PostDetail {
            post,
            comments,
            author_post_count,
        })
    }

    #[instrument(skip(self, viewer, text), fields(request_id = %viewer.request_id))]
    pub async fn add_comment(&self, viewer: &ViewerContext, post_id: i64, text: &str) -> AppResult<Comment> {
        let author = viewer.require_user()?;
        validation::validate_comment_text(text)?;
        let comment = self
            .store
            .create_comment(NewComment::new(post_id, author.id, text))
            .await?;
        info!(comment_id = comment.id, post_id, "Added comment");
        Ok(comment)
    }

    #[instrument(skip(self, viewer), fields(request_id = %viewer.request_id))]
    pub async fn profile(&self, viewer: &ViewerContext, username: &str, page: i64) -> AppResult<Profile> {
        let (author, posts) = self.feeds.author_feed(username, page).await?;
        let following = match viewer.user() {
            Some(user) if user.id != author.id => self.store.follow_exists(user.id, author.id).await?,
            _ => false,
        };

        Ok(Profile {
            post_count: posts.page.total,
            author,
            posts,
            following,
        })
    }

    /// Following an already-followed author is a no-op. Returns whether a
    /// new edge was written.
    #[instrument(skip(self, viewer), fields(request_id = %viewer.request_id))]
    pub async fn follow(&self, viewer: &ViewerContext, username: &str) -> AppResult<bool> {
        let user = viewer.require_user()?;
        let author = self.get_author(username).await?;
        let created = self.store.follow_if_absent(user.id, author.id).await?;
        info!(follower = %user, author = %author, created, "Follow");
        Ok(created)
    }

    /// Unfollowing an author that is not followed is a no-op. Returns
    /// whether an edge was removed.
    #[instrument(skip(self, viewer), fields(request_id = %viewer.request_id))]
    pub async fn unfollow(&self, viewer: &ViewerContext, username: &str) -> AppResult<bool> {
        let user = viewer.require_user()?;
        let author = self.get_author(username).await?;
        let removed = self.store.delete_follow(user.id, author.id).await?;
        info!(follower = %user, author = %author, removed, "Unfollow");
        Ok(removed)
    }

    /// Administrative delete. Image files of every post removed by the
    /// cascade are discarded once the store has committed.
    #[instrument(skip(self, viewer, entity), fields(request_id = %viewer.request_id, entity = %entity))]
    pub async fn delete_entity(&self, viewer: &ViewerContext, entity: EntityRef) -> AppResult<bool> {
        viewer.require_system()?;
        let Some(attachments) = self.store.delete_collecting_attachments(entity).await? else {
            return Ok(false);
        };
        for reference in &attachments {
            self.discard_image(Some(reference)).await;
        }
        Ok(true)
    }

    async fn get_post(&self, post_id: i64) -> AppResult<Post> {
        self.store
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
    }

    async fn get_author(&self, username: &str) -> AppResult<User> {
        self.store
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", username)))
    }

    async fn resolve_group(&self, slug: Option<&str>) -> AppResult<Option<i64>> {
        let Some(slug) = slug else {
            return Ok(None);
        };
        let group = self
            .store
            .get_group_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {}", slug)))?;
        Ok(Some(group.id))
    }

    async fn store_image(&self, upload: Option<&ImageUpload>) -> AppResult<Option<String>> {
        match upload {
            Some(upload) => Ok(Some(
                self.attachments
                    .store(&upload.filename, &upload.content)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    async fn discard_image(&self, reference: Option<&str>) {
        if let Some(reference) = reference {
            if let Err(err) = self.attachments.remove(reference).await {
                warn!(reference, error = %err, "Failed to remove attachment");
            }
        }
    }
}
