//! Redirect resolution for link shorteners and news-aggregator links.
//!
//! Aggregator links wrap a genuine destination behind a redirect that often
//! ends on a bot wall. Resolution tries, in order: following the redirect with
//! primed cookies and a referer, then the destination embedded in the `url`
//! query parameter, then a plain redirect follow. URLs on any other host are
//! returned unchanged without touching the network.

use tracing::{debug, info, warn};
use url::Url;

use super::error::{RedirectBlockedError, ResolveError};
use super::transport::RateLimitedTransport;

/// A news-aggregator host and the parent site used for cookie priming.
#[derive(Debug, Clone)]
pub struct AggregatorRule {
    /// Host (or parent domain) of the aggregator, e.g. `news.google.com`.
    pub host: String,
    /// Site visited first to establish cookies, also sent as the referer.
    pub parent_site: String,
}

/// Host patterns and block markers used during resolution.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub aggregators: Vec<AggregatorRule>,
    pub shortener_hosts: Vec<String>,
    /// Substrings that identify an interstitial/CAPTCHA page in a resolved URL.
    pub blocked_markers: Vec<String>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            aggregators: vec![AggregatorRule {
                host: "news.google.com".to_string(),
                parent_site: "https://www.google.com".to_string(),
            }],
            shortener_hosts: [
                "t.co",
                "bit.ly",
                "tinyurl.com",
                "goo.gl",
                "ow.ly",
                "buff.ly",
                "is.gd",
                "lnkd.in",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            blocked_markers: vec!["sorry".to_string(), "captcha".to_string()],
        }
    }
}

/// Result of best-effort resolution, as consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    /// URL to capture: the resolved URL, or the original one when resolution failed.
    pub final_url: String,
    pub blocked: bool,
    pub block_reason: Option<String>,
}

/// Follows or short-circuits redirect chains through the shared transport.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    transport: RateLimitedTransport,
    config: RedirectConfig,
}

impl RedirectResolver {
    #[must_use]
    pub fn new(transport: RateLimitedTransport, config: RedirectConfig) -> Self {
        Self { transport, config }
    }

    /// Resolve `url` to the URL of the content it points at.
    ///
    /// URLs that are neither aggregator nor shortener links come back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Blocked`] when the chain ends on a bot wall, and
    /// other variants for unparseable URLs or network failures.
    pub async fn resolve(&self, url: &str) -> Result<String, ResolveError> {
        let parsed = Url::parse(url).map_err(|e| ResolveError::InvalidUrl {
            url: url.to_string(),
            source: e,
        })?;

        let Some(host) = parsed.host_str() else {
            return Ok(url.to_string());
        };

        if let Some(rule) = self.aggregator_for(host) {
            return self.resolve_aggregator(url, &parsed, rule).await;
        }

        if self.is_shortener(host) {
            return self.follow(url, None).await;
        }

        Ok(url.to_string())
    }

    /// Resolve `url`, falling back to the original URL on any failure.
    pub async fn resolve_best_effort(&self, url: &str) -> RedirectOutcome {
        match self.resolve(url).await {
            Ok(final_url) => {
                if final_url != url {
                    info!(original = %url, resolved = %final_url, "Resolved URL");
                }
                RedirectOutcome {
                    final_url,
                    blocked: false,
                    block_reason: None,
                }
            }
            Err(ResolveError::Blocked(e)) => {
                warn!(url = %url, error = %e, "Redirect ended on a block page, using original URL");
                RedirectOutcome {
                    final_url: url.to_string(),
                    blocked: true,
                    block_reason: Some(e.to_string()),
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to resolve redirects, using original URL");
                RedirectOutcome {
                    final_url: url.to_string(),
                    blocked: false,
                    block_reason: None,
                }
            }
        }
    }

    async fn resolve_aggregator(
        &self,
        url: &str,
        parsed: &Url,
        rule: &AggregatorRule,
    ) -> Result<String, ResolveError> {
        // Priming only needs the cookies; the response itself is irrelevant.
        if let Err(e) = self.transport.final_url(&rule.parent_site, None).await {
            warn!(site = %rule.parent_site, error = %e, "Failed to prime cookies");
        }
        tokio::time::sleep(self.transport.min_spacing()).await;

        match self.transport.final_url(url, Some(&rule.parent_site)).await {
            Ok(resolved) => {
                let still_wrapped = resolved
                    .host_str()
                    .is_some_and(|h| self.aggregator_for(h).is_some());
                if !still_wrapped && self.blocked_marker(resolved.as_str()).is_none() {
                    return Ok(resolved.to_string());
                }
                debug!(url = %url, resolved = %resolved, "Aggregator did not redirect to content");
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Aggregator redirect failed");
            }
        }

        if let Some(target) = embedded_target(parsed) {
            debug!(url = %url, target = %target, "Using destination from url parameter");
            return Ok(target);
        }

        self.follow(url, None).await
    }

    async fn follow(&self, url: &str, referer: Option<&str>) -> Result<String, ResolveError> {
        let resolved = self.transport.final_url(url, referer).await?;
        if let Some(marker) = self.blocked_marker(resolved.as_str()) {
            return Err(RedirectBlockedError {
                final_url: resolved.to_string(),
                marker: marker.to_string(),
            }
            .into());
        }
        Ok(resolved.to_string())
    }

    fn aggregator_for(&self, host: &str) -> Option<&AggregatorRule> {
        self.config
            .aggregators
            .iter()
            .find(|rule| host_matches(host, &rule.host))
    }

    fn is_shortener(&self, host: &str) -> bool {
        self.config
            .shortener_hosts
            .iter()
            .any(|pattern| host_matches(host, pattern))
    }

    fn blocked_marker(&self, url: &str) -> Option<&str> {
        let lower = url.to_lowercase();
        self.config
            .blocked_markers
            .iter()
            .find(|marker| lower.contains(marker.as_str()))
            .map(String::as_str)
    }
}

/// Exact host match or subdomain match, case-insensitive.
fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

/// Destination carried in the `url` query parameter, already percent-decoded.
fn embedded_target(parsed: &Url) -> Option<String> {
    parsed
        .query_pairs()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| Url::parse(value).is_ok())
}
