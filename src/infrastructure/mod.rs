// Core infrastructure modules
pub mod attachments; // Post image storage
pub mod cache; // TTL page cache
pub mod database; // Entity store interface
pub mod middleware; // Request viewer resolution
pub mod sqlite_database; // SQLite entity store
pub mod viewer; // Viewer context

pub use attachments::{AttachmentStore, FsAttachmentStore};
pub use cache::{Cache, PageCache};
pub use database::{EntityStore, PostFilter, PostOrder, PostQuery};
pub use sqlite_database::SqliteDatabase;
pub use viewer::{Viewer, ViewerContext};
