//! Rate-limited HTTP transport shared by every outbound capture request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::error::FetchError;
use crate::constants::{ARCHIVAL_USER_AGENT, BROWSER_HEADERS};

/// Default minimum spacing between two outbound requests.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of redirects followed for a single request.
const MAX_REDIRECTS: usize = 10;

/// HTTP transport that enforces a minimum delay between requests.
///
/// Clones share both the connection pool (with its cookie store) and the
/// "last request" timestamp, so one transport per process rate-limits page
/// fetches, asset fetches and cookie priming together. The timestamp lock is
/// held while sleeping, which serializes concurrent callers.
#[derive(Debug, Clone)]
pub struct RateLimitedTransport {
    client: Client,
    min_spacing: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitedTransport {
    /// Create a transport with browser-like default headers and a cookie store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(min_spacing: Duration, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(ARCHIVAL_USER_AGENT)
            .default_headers(browser_headers())
            .cookie_store(true)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self {
            client,
            min_spacing,
            last_request: Arc::new(Mutex::new(None)),
        })
    }

    /// Minimum spacing enforced between requests.
    #[must_use]
    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Fetch `url` and return the (decompressed) body.
    ///
    /// Any status other than 200 is an error carrying the status code.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid URLs, network failures and non-200 responses.
    pub async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url, referer).await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            source: e,
        })?;

        debug!(url = %url, size = body.len(), "Fetched");
        Ok(body.to_vec())
    }

    /// Issue a GET, follow redirects, and return the URL the final response came from.
    ///
    /// The status of the final response is not checked; interstitial pages are
    /// detected by the caller from the URL.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid URLs and network failures.
    pub async fn final_url(&self, url: &str, referer: Option<&str>) -> Result<Url, FetchError> {
        let response = self.send(url, referer).await?;
        let final_url = response.url().clone();
        // Drain the body so the connection can be reused and cookies are stored.
        let _ = response.bytes().await;
        debug!(url = %url, final_url = %final_url, "Followed redirects");
        Ok(final_url)
    }

    async fn send(&self, url: &str, referer: Option<&str>) -> Result<Response, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            source: e,
        })?;

        self.wait_turn().await;

        let mut request = self.client.get(parsed);
        if let Some(referer) = referer.filter(|r| !r.is_empty()) {
            request = request.header(REFERER, referer);
        }

        request.send().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            source: e,
        })
    }

    /// Sleep until at least `min_spacing` has passed since the previous request,
    /// then record the current time as the latest request.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_spacing {
                tokio::time::sleep(self.min_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in BROWSER_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}
