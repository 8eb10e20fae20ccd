// Feed composer - the four post listings, each newest-first and paginated
// with the page size configured for its context

use std::sync::Arc;
use tracing::instrument;

use crate::config::PaginationConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, PostFilter, PostQuery};
use crate::infrastructure::viewer::ViewerContext;
use crate::models::{Group, Post, User};
use crate::pagination::{Page, PageWindow};

#[derive(Clone)]
pub struct FeedComposer {
    store: Arc<dyn EntityStore>,
    page_sizes: PaginationConfig,
}

impl FeedComposer {
    pub fn new(store: Arc<dyn EntityStore>, page_sizes: PaginationConfig) -> Self {
        Self { store, page_sizes }
    }

    pub fn page_sizes(&self) -> &PaginationConfig {
        &self.page_sizes
    }

    /// Every post.
    #[instrument(skip(self))]
    pub async fn global_feed(&self, page: i64) -> AppResult<Page<Post>> {
        self.page_of(PostFilter::All, self.page_sizes.index, page).await
    }

    #[instrument(skip(self))]
    pub async fn group_feed(&self, slug: &str, page: i64) -> AppResult<(Group, Page<Post>)> {
        let group = self
            .store
            .get_group_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {}", slug)))?;
        let posts = self
            .page_of(PostFilter::Group(group.id), self.page_sizes.group, page)
            .await?;
        Ok((group, posts))
    }

    #[instrument(skip(self))]
    pub async fn author_feed(&self, username: &str, page: i64) -> AppResult<(User, Page<Post>)> {
        let author = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", username)))?;
        let posts = self
            .page_of(PostFilter::Author(author.id), self.page_sizes.profile, page)
            .await?;
        Ok((author, posts))
    }

    /// Posts by authors the viewer follows. Following nobody yields an
    /// empty page.
    #[instrument(skip(self, viewer), fields(request_id = %viewer.request_id))]
    pub async fn subscription_feed(&self, viewer: &ViewerContext, page: i64) -> AppResult<Page<Post>> {
        let user = viewer.require_user()?;
        self.page_of(PostFilter::FollowedBy(user.id), self.page_sizes.follow, page)
            .await
    }

    async fn page_of(&self, filter: PostFilter, per_page: usize, requested: i64) -> AppResult<Page<Post>> {
        let total = self.store.count_posts(filter).await?;
        let window = PageWindow::new(total, per_page, requested);
        if window.is_empty() {
            return Ok(Page::new(Vec::new(), window));
        }

        let query = PostQuery::new(filter)
            .limit(window.limit())
            .offset(window.offset());
        let posts = self.store.find_posts(&query).await?;
        Ok(Page::new(posts, window))
    }
}
