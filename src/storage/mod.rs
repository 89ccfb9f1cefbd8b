//! Filesystem-backed result store.
//!
//! Remote names are used as file names inside the store root. Path
//! separators are replaced so a test name can never escape the root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::lab::ResultStore;

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (or create) the store directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create result store at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `remote_name` lands inside the store.
    pub fn path_for(&self, remote_name: &str) -> PathBuf {
        self.root.join(sanitize(remote_name))
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

#[async_trait::async_trait]
impl ResultStore for LocalStore {
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<()> {
        let dest = self.path_for(remote_name);
        tokio::fs::copy(local_path, &dest)
            .await
            .with_context(|| format!("failed to copy {} to {}", local_path.display(), dest.display()))?;
        debug!(src = %local_path.display(), dest = %dest.display(), "Uploaded artifact");
        Ok(())
    }

    async fn upload_text(&self, content: &str, remote_name: &str) -> Result<()> {
        let dest = self.path_for(remote_name);
        tokio::fs::write(&dest, content)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        debug!(dest = %dest.display(), bytes = content.len(), "Uploaded text");
        Ok(())
    }
}
