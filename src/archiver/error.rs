//! Error taxonomy for the capture pipeline.
//!
//! Only [`ArchiveError`] escapes [`crate::archiver::Archiver::archive_url`]; the
//! other types describe steps the pipeline recovers from.

use std::path::PathBuf;

use thiserror::Error;

/// Failure fetching a URL through the rate-limited transport.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to get URL '{url}': {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to get URL '{url}': status code {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read response body from '{url}': {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// HTTP status code, when the failure was a non-200 response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A redirect chain ended on an interstitial, CAPTCHA or "sorry" page.
#[derive(Debug, Error)]
#[error("access blocked by CAPTCHA or sorry page: {final_url} (matched '{marker}')")]
pub struct RedirectBlockedError {
    pub final_url: String,
    pub marker: String,
}

/// Failure resolving a redirect chain.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Blocked(#[from] RedirectBlockedError),
    #[error("failed to resolve redirects: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Why downloaded asset bytes were rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetValidationError {
    #[error("asset body is empty")]
    Empty,
    #[error("control byte 0x{byte:02x} at offset {offset} in text asset")]
    BinaryContent { byte: u8, offset: usize },
}

/// Failure localizing a single asset. Always recovered by skipping the asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch asset: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid asset content for '{url}': {source}")]
    Validation {
        url: String,
        #[source]
        source: AssetValidationError,
    },
    #[error("failed to save asset to '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of the headless-browser screenshot step.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("screenshot capture is disabled")]
    Disabled,
    #[error("failed to build browser config: {0}")]
    Config(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to render page '{url}': {message}")]
    Navigation { url: String, message: String },
    #[error("screenshot of '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("browser returned an empty screenshot for '{url}'")]
    Empty { url: String },
    #[error("failed to write screenshot to '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal failure of a capture. No entry exists and no files remain afterwards.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create storage directory '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch raw HTML for '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to modify HTML paths for '{url}': {message}")]
    Rewrite { url: String, message: String },
    #[error("failed to write HTML to '{}': {source}", path.display())]
    WriteHtml {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create archive entry for '{url}': {source:#}")]
    Persistence {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}
