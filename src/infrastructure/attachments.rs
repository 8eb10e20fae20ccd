// Attachment storage - post images are written here and the post row keeps
// only the returned reference

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Prefix shared by every post image reference.
pub const POST_IMAGE_DIR: &str = "posts";

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Persist the payload and return its storage reference.
    async fn store(&self, filename: &str, content: &[u8]) -> AppResult<String>;
    async fn remove(&self, reference: &str) -> AppResult<()>;
}

/// Stores attachments below a media root directory.
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }
}

/// Keep `[A-Za-z0-9._-]` from the final path component; anything else
/// becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn store(&self, filename: &str, content: &[u8]) -> AppResult<String> {
        if content.is_empty() {
            return Err(AppError::Validation("empty attachment".to_string()));
        }

        let reference = format!(
            "{}/{}-{}",
            POST_IMAGE_DIR,
            Uuid::new_v4(),
            sanitize_filename(filename)
        );
        let path = self.path_for(&reference);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!(reference = %reference, bytes = content.len(), "Stored attachment");
        Ok(reference)
    }

    async fn remove(&self, reference: &str) -> AppResult<()> {
        let path = self.path_for(reference);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(reference, "Attachment already gone");
                Ok(())
            }
            Err(e) => Err(AppError::Internal(format!(
                "removing {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
