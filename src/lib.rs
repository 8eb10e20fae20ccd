// Yatube - blog platform core: entity store, feeds, pagination, validation

// Domain model and relationship declarations
pub mod models;
pub mod schema;

// Rules and listing mechanics
pub mod pagination;
pub mod validation;

// Store, cache, attachments and request context
pub mod infrastructure;

// Business operations and HTTP surface
pub mod api;
pub mod app_state;
pub mod services;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
