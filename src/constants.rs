//! Shared constants used across the application.

/// User agent string used for every outbound capture request.
///
/// This is a realistic desktop browser user agent so that origin servers serve
/// the same markup a visitor would see.
pub const ARCHIVAL_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser-like request headers sent alongside the user agent.
///
/// Names are lowercase so they can be used as static header names.
/// `Accept-Encoding` is left to the HTTP client, which negotiates gzip and
/// decompresses response bodies itself.
pub const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
    ),
    ("accept-language", "ja,en-US;q=0.9,en;q=0.8"),
    ("dnt", "1"),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
];
