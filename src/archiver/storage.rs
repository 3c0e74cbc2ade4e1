//! On-disk layout of captured content.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ArchiveError;

const RAW_DIR: &str = "raw";
const ASSETS_DIR: &str = "assets";
const SCREENSHOTS_DIR: &str = "screenshots";

/// Directories holding raw HTML, assets and screenshots under one data root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    #[must_use]
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    #[must_use]
    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join(SCREENSHOTS_DIR)
    }

    /// `<raw>/<capture_id>.html`
    #[must_use]
    pub fn html_path(&self, capture_id: &str) -> PathBuf {
        self.raw_dir().join(format!("{capture_id}.html"))
    }

    /// `<screenshots>/<capture_id>.jpg`
    #[must_use]
    pub fn screenshot_path(&self, capture_id: &str) -> PathBuf {
        self.screenshots_dir().join(format!("{capture_id}.jpg"))
    }

    /// Create every storage directory if missing.
    ///
    /// # Errors
    ///
    /// Returns an error naming the directory that could not be created.
    pub async fn ensure_dirs(&self) -> Result<(), ArchiveError> {
        for dir in [self.raw_dir(), self.assets_dir(), self.screenshots_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ArchiveError::Storage {
                    path: dir.clone(),
                    source: e,
                })?;
            debug!(path = %dir.display(), "Storage directory ready");
        }
        Ok(())
    }
}
