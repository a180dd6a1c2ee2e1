use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

/// Scratch directory shared by consecutive submissions.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

pub const SOURCES_DIR: &str = "sources";

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR)
    }

    /// Remove leftovers from the previous run. Hidden entries are kept and
    /// entries that cannot be deleted are logged and skipped.
    pub async fn reset(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let path = entry.path();
            let removed = match entry.file_type().await {
                Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
                Ok(_) => tokio::fs::remove_file(&path).await,
                Err(err) => Err(err),
            };
            if let Err(err) = removed {
                warn!(path = %path.display(), error = %err, "could not delete scratch entry");
            }
        }

        tokio::fs::create_dir_all(self.sources_dir()).await?;
        debug!(root = %self.root.display(), "scratch workspace reset");
        Ok(())
    }

    pub async fn write_bytes(&self, relative: impl AsRef<Path>, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
        self.write_bytes(name, &bytes).await
    }
}
