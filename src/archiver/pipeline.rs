//! The capture pipeline: one URL in, one archive entry out.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::assets::{extract_assets, extract_title, rewrite_asset_paths};
use super::error::{ArchiveError, FetchError};
use super::localizer::localize_assets;
use super::redirect::RedirectResolver;
use super::screenshot::ScreenshotCapturer;
use super::storage::StorageLayout;
use super::transport::RateLimitedTransport;
use crate::config::Config;
use crate::db::{ArchiveEntry, NewArchiveEntry};

/// Persistence used by the pipeline for the final record.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Commit a new entry and return it as stored.
    async fn insert_entry(&self, entry: &NewArchiveEntry) -> anyhow::Result<ArchiveEntry>;
}

/// Summary of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub final_url: String,
    pub html_path: PathBuf,
    pub screenshot_path: Option<PathBuf>,
    pub asset_count: usize,
    /// Redirect resolution ended on a bot wall and the original URL was used.
    pub redirect_blocked: bool,
}

/// Files written by one capture, removed on drop unless committed.
///
/// Removal also runs if the capture future is dropped midway.
#[derive(Debug, Default)]
struct CaptureFiles {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl CaptureFiles {
    fn track(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for CaptureFiles {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed file from failed capture"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove file from failed capture"
                ),
            }
        }
    }
}

/// Runs captures. One instance is shared process-wide so every capture goes
/// through the same rate-limited transport.
#[derive(Debug, Clone)]
pub struct Archiver {
    transport: RateLimitedTransport,
    resolver: RedirectResolver,
    screenshot: ScreenshotCapturer,
    layout: StorageLayout,
    asset_url_prefix: String,
}

impl Archiver {
    /// Build the pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let transport = RateLimitedTransport::new(config.request_delay, config.request_timeout)
            .context("Failed to build HTTP client")?;
        let resolver = RedirectResolver::new(transport.clone(), config.redirect_config());

        Ok(Self {
            transport,
            resolver,
            screenshot: ScreenshotCapturer::new(config.screenshot_config()),
            layout: StorageLayout::new(config.data_dir.clone()),
            asset_url_prefix: config.asset_url_prefix.clone(),
        })
    }

    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    #[must_use]
    pub fn transport(&self) -> &RateLimitedTransport {
        &self.transport
    }

    /// Create the raw, assets and screenshots directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub async fn ensure_storage_dirs(&self) -> Result<(), ArchiveError> {
        self.layout.ensure_dirs().await
    }

    /// Capture `url` and persist an entry for it.
    ///
    /// # Errors
    ///
    /// Fails if the page cannot be fetched, rewritten or written, or the entry
    /// cannot be persisted. No entry and no files remain after a failure.
    pub async fn archive_url<S>(&self, store: &S, url: &str) -> Result<ArchiveEntry, ArchiveError>
    where
        S: ArchiveStore + ?Sized,
    {
        let (entry, _) = self.archive_url_with_result(store, url).await?;
        Ok(entry)
    }

    /// Like [`Archiver::archive_url`], also returning the capture summary.
    ///
    /// # Errors
    ///
    /// See [`Archiver::archive_url`].
    pub async fn archive_url_with_result<S>(
        &self,
        store: &S,
        url: &str,
    ) -> Result<(ArchiveEntry, CaptureResult), ArchiveError>
    where
        S: ArchiveStore + ?Sized,
    {
        self.ensure_storage_dirs().await?;

        let outcome = self.resolver.resolve_best_effort(url).await;
        let final_url = outcome.final_url;

        let capture_id = Uuid::new_v4().to_string();
        let mut files = CaptureFiles::default();

        let body = self
            .transport
            .fetch(&final_url, None)
            .await
            .map_err(|e| ArchiveError::Fetch {
                url: final_url.clone(),
                source: e,
            })?;
        let base = Url::parse(&final_url).map_err(|e| ArchiveError::Fetch {
            url: final_url.clone(),
            source: FetchError::InvalidUrl {
                url: final_url.clone(),
                source: e,
            },
        })?;
        let html = String::from_utf8_lossy(&body);

        let references = extract_assets(&html, &base);
        debug!(url = %final_url, count = references.len(), "Found asset references");

        let assets_dir = self.layout.assets_dir();
        let localized = localize_assets(
            &self.transport,
            &references,
            &capture_id,
            &assets_dir,
            |path| files.track(path.to_path_buf()),
        )
        .await;

        let rewritten = rewrite_asset_paths(&body, &base, &capture_id, &self.asset_url_prefix)
            .map_err(|e| ArchiveError::Rewrite {
                url: final_url.clone(),
                message: format!("{e:#}"),
            })?;

        let html_path = self.layout.html_path(&capture_id);
        files.track(html_path.clone());
        tokio::fs::write(&html_path, &rewritten)
            .await
            .map_err(|e| ArchiveError::WriteHtml {
                path: html_path.clone(),
                source: e,
            })?;

        let screenshot_path = self
            .capture_screenshot(&final_url, &capture_id, &mut files)
            .await;

        let new_entry = NewArchiveEntry {
            id: capture_id,
            url: final_url.clone(),
            title: extract_title(&html),
            storage_path: path_string(&html_path),
            screenshot_path: screenshot_path.as_deref().map(path_string),
            archived_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };

        let entry = store
            .insert_entry(&new_entry)
            .await
            .map_err(|e| ArchiveError::Persistence {
                url: final_url.clone(),
                source: e,
            })?;
        files.commit();

        let result = CaptureResult {
            final_url,
            html_path,
            screenshot_path,
            asset_count: localized.len(),
            redirect_blocked: outcome.blocked,
        };
        info!(
            id = %entry.id,
            url = %result.final_url,
            html = %result.html_path.display(),
            assets = result.asset_count,
            screenshot = result.screenshot_path.is_some(),
            "Archived URL"
        );

        Ok((entry, result))
    }

    /// Best-effort screenshot. Returns the intended path whenever capture is
    /// enabled, even if the attempt failed.
    async fn capture_screenshot(
        &self,
        url: &str,
        capture_id: &str,
        files: &mut CaptureFiles,
    ) -> Option<PathBuf> {
        if !self.screenshot.is_enabled() {
            return None;
        }

        let path = self.layout.screenshot_path(capture_id);
        files.track(path.clone());
        if let Err(e) = self.screenshot.capture(url, &path).await {
            warn!(url = %url, error = %e, "Failed to capture screenshot");
        }
        Some(path)
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}
