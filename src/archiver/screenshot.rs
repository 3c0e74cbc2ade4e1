//! Screenshot capture using headless Chrome/Chromium.
//!
//! A fresh browser process is launched for every capture and torn down
//! afterwards, so a hung page never outlives its attempt.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::ScreenshotError;

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height in pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;

/// Default bound on one screenshot attempt, in seconds.
pub const DEFAULT_SCREENSHOT_TIMEOUT_SECS: u64 = 60;

/// Default JPEG quality.
pub const DEFAULT_SCREENSHOT_QUALITY: u8 = 80;

/// Default wait after the body is ready, in milliseconds.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Time allowed for a graceful browser close before the process is killed.
const BROWSER_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Flags every browser launch gets, ahead of operator-supplied ones.
const BASE_BROWSER_FLAGS: &[&str] = &[
    "--headless=new",
    "--disable-gpu",
    "--single-process",
    "--ignore-certificate-errors",
];

/// Screenshot capture configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ScreenshotConfig {
    /// Whether screenshot capture is enabled.
    pub enabled: bool,
    /// Bound on one attempt, from navigation to the captured bytes.
    pub timeout: Duration,
    /// JPEG quality, 1 to 100.
    pub quality: u8,
    /// Wait after the body is ready, for late-loading content.
    pub settle_delay: Duration,
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    /// Extra command-line flags appended to the fixed set.
    pub extra_flags: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_secs(DEFAULT_SCREENSHOT_TIMEOUT_SECS),
            quality: DEFAULT_SCREENSHOT_QUALITY,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            chrome_path: None,
            extra_flags: Vec::new(),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

impl ScreenshotConfig {
    /// Full flag list passed to the browser.
    #[must_use]
    pub fn browser_flags(&self) -> Vec<String> {
        BASE_BROWSER_FLAGS
            .iter()
            .map(ToString::to_string)
            .chain(self.extra_flags.iter().cloned())
            .collect()
    }
}

/// Renders pages in a headless browser and saves full-page JPEG snapshots.
#[derive(Debug, Clone)]
pub struct ScreenshotCapturer {
    config: ScreenshotConfig,
}

impl ScreenshotCapturer {
    #[must_use]
    pub fn new(config: ScreenshotConfig) -> Self {
        Self { config }
    }

    /// Check if screenshot capture is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn config(&self) -> &ScreenshotConfig {
        &self.config
    }

    /// Render `url` and write a JPEG to `output_path`.
    ///
    /// The whole attempt (launch, render, close and write) shares one
    /// deadline of `timeout`. On any failure, including the timeout, nothing
    /// is left at `output_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if capture is disabled, the browser cannot be
    /// launched, rendering fails or times out, or the file cannot be written.
    pub async fn capture(&self, url: &str, output_path: &Path) -> Result<(), ScreenshotError> {
        if !self.config.enabled {
            return Err(ScreenshotError::Disabled);
        }

        bounded_attempt(
            url,
            output_path,
            self.config.timeout,
            self.capture_to_file(url, output_path),
        )
        .await
    }

    async fn capture_to_file(&self, url: &str, output_path: &Path) -> Result<(), ScreenshotError> {
        let browser_config = self.browser_config()?;

        debug!(url = %url, "Launching headless browser for screenshot");
        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScreenshotError::Launch(e.to_string()))?;

        let _handler_task = HandlerTask(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        }));

        let rendered = self.render(&browser, url).await;

        match tokio::time::timeout(BROWSER_CLOSE_TIMEOUT, browser.close()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Failed to close browser: {e}"),
            Err(_) => debug!("Timed out closing browser"),
        }
        // Dropping the browser kills the child process if it is still running.
        drop(browser);

        let jpeg = rendered?;
        if jpeg.is_empty() {
            return Err(ScreenshotError::Empty {
                url: url.to_string(),
            });
        }

        write_via_temp(output_path, &jpeg).await?;
        info!(url = %url, path = %output_path.display(), size = jpeg.len(), "Screenshot captured");
        Ok(())
    }

    async fn render(&self, browser: &Browser, url: &str) -> Result<Vec<u8>, ScreenshotError> {
        let navigation = |e: CdpError| ScreenshotError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };

        let page = browser.new_page(url).await.map_err(navigation)?;
        page.wait_for_navigation().await.map_err(navigation)?;
        page.find_element("body").await.map_err(navigation)?;

        tokio::time::sleep(self.config.settle_delay).await;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(i64::from(self.config.quality))
            .full_page(true)
            .build();
        let jpeg = page.screenshot(params).await.map_err(navigation)?;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {e}");
        }

        Ok(jpeg)
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScreenshotError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .launch_timeout(self.config.timeout)
            .request_timeout(self.config.timeout)
            .no_sandbox()
            .disable_default_args()
            .args(self.config.browser_flags());

        if let Some(ref chrome_path) = self.config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        builder.build().map_err(ScreenshotError::Config)
    }
}

/// Browser event loop, aborted when the attempt ends or is dropped.
struct HandlerTask(JoinHandle<()>);

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one capture attempt under `limit`, clearing `output_path` (and its
/// temp sibling) if the attempt fails or runs out of time.
async fn bounded_attempt<F>(
    url: &str,
    output_path: &Path,
    limit: Duration,
    attempt: F,
) -> Result<(), ScreenshotError>
where
    F: Future<Output = Result<(), ScreenshotError>>,
{
    let result = match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ScreenshotError::Timeout {
            url: url.to_string(),
            secs: limit.as_secs(),
        }),
    };

    if result.is_err() {
        remove_if_present(output_path).await;
    }
    result
}

/// Write to a sibling temp file and rename into place.
async fn write_via_temp(path: &Path, bytes: &[u8]) -> Result<(), ScreenshotError> {
    let temp = temp_path(path);
    let result = match tokio::fs::write(&temp, bytes).await {
        Ok(()) => tokio::fs::rename(&temp, path).await,
        Err(e) => Err(e),
    };

    result.map_err(|e| ScreenshotError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn remove_if_present(path: &Path) {
    for candidate in [path.to_path_buf(), temp_path(path)] {
        match tokio::fs::remove_file(&candidate).await {
            Ok(()) => debug!(path = %candidate.display(), "Removed incomplete screenshot"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %candidate.display(), error = %e, "Failed to remove screenshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScreenshotConfig::default();
        assert_eq!(config.viewport_width, DEFAULT_VIEWPORT_WIDTH);
        assert_eq!(config.viewport_height, DEFAULT_VIEWPORT_HEIGHT);
        assert_eq!(config.quality, DEFAULT_SCREENSHOT_QUALITY);
        assert!(!config.enabled);
    }

    #[test]
    fn test_browser_flags_append_extra() {
        let config = ScreenshotConfig {
            extra_flags: vec!["--lang=ja".to_string()],
            ..Default::default()
        };
        let flags = config.browser_flags();
        assert_eq!(flags.first().map(String::as_str), Some("--headless=new"));
        assert!(flags.iter().any(|f| f == "--single-process"));
        assert!(flags.iter().any(|f| f == "--ignore-certificate-errors"));
        assert_eq!(flags.last().map(String::as_str), Some("--lang=ja"));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let temp = temp_path(Path::new("/data/screenshots/abc.jpg"));
        assert_eq!(temp, PathBuf::from("/data/screenshots/abc.jpg.part"));
    }

    #[tokio::test]
    async fn test_disabled_capture_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.jpg");
        let capturer = ScreenshotCapturer::new(ScreenshotConfig::default());

        let err = capturer.capture("https://example.com", &output).await.unwrap_err();
        assert!(matches!(err, ScreenshotError::Disabled));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.jpg");
        // A stale file from an earlier attempt must not survive a failure.
        std::fs::write(&output, b"stale").unwrap();

        let capturer = ScreenshotCapturer::new(ScreenshotConfig {
            enabled: true,
            timeout: Duration::from_secs(5),
            chrome_path: Some(dir.path().join("no-such-chrome").display().to_string()),
            ..Default::default()
        });

        let result = capturer.capture("https://example.com", &output).await;
        assert!(result.is_err());
        assert!(!output.exists());
        assert!(!temp_path(&output).exists());
    }

    #[tokio::test]
    async fn test_attempt_past_deadline_times_out_and_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.jpg");
        std::fs::write(&output, b"stale").unwrap();

        // Half-written temp file, then the page never finishes.
        let partial = temp_path(&output);
        let attempt = async {
            tokio::fs::write(&partial, [0xFF, 0xD8]).await.unwrap();
            std::future::pending::<Result<(), ScreenshotError>>().await
        };

        let err = bounded_attempt(
            "https://example.com/slow",
            &output,
            Duration::from_millis(100),
            attempt,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ScreenshotError::Timeout { ref url, .. } if url == "https://example.com/slow"
        ));
        assert!(!output.exists());
        assert!(!temp_path(&output).exists());
    }

    #[tokio::test]
    async fn test_attempt_within_deadline_keeps_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.jpg");

        bounded_attempt(
            "https://example.com",
            &output,
            Duration::from_secs(5),
            write_via_temp(&output, &[0xFF, 0xD8, 0xFF]),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_write_via_temp() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.jpg");
        write_via_temp(&output, &[0xFF, 0xD8, 0xFF]).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), vec![0xFF, 0xD8, 0xFF]);
        assert!(!temp_path(&output).exists());
    }
}
