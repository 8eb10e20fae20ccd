use std::sync::Arc;

use crate::{
    config::Config,
    infrastructure::{
        attachments::{AttachmentStore, FsAttachmentStore},
        cache::PageCache,
        database::EntityStore,
        middleware::HasViewerResolver,
        sqlite_database::SqliteDatabase,
    },
    services::{FeedComposer, PostService},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub feeds: FeedComposer,
    pub posts: PostService,
    pub page_cache: Arc<PageCache>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.pagination.validate()?;

        let database = SqliteDatabase::connect(&config.database.url).await?;

        let attachments = Arc::new(FsAttachmentStore::new(&config.media.root));
        Ok(Self::with_parts(Arc::new(database), attachments, config))
    }

    /// Wire the services around an existing store.
    pub fn with_parts(
        store: Arc<dyn EntityStore>,
        attachments: Arc<dyn AttachmentStore>,
        config: Config,
    ) -> Self {
        let feeds = FeedComposer::new(store.clone(), config.pagination);
        let posts = PostService::new(store.clone(), attachments.clone(), feeds.clone());
        let page_cache = Arc::new(PageCache::new(
            config.cache.capacity,
            config.cache.index_ttl(),
        ));

        Self {
            store,
            attachments,
            feeds,
            posts,
            page_cache,
            config,
        }
    }
}

impl HasViewerResolver for AppState {
    fn entity_store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn admin_token(&self) -> Option<&str> {
        self.config.auth.admin_token.as_deref()
    }
}
