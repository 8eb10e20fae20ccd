// Application services - business operations built on the entity store
pub mod feed;
pub mod posts;

pub use feed::FeedComposer;
pub use posts::{ImageUpload, PostDetail, PostDraft, PostService, Profile};
