use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::archiver::redirect::RedirectConfig;
use crate::archiver::screenshot::{
    ScreenshotConfig, DEFAULT_SCREENSHOT_QUALITY, DEFAULT_SCREENSHOT_TIMEOUT_SECS,
    DEFAULT_SETTLE_DELAY_MS,
};

/// Every extra browser flag must start with this prefix.
const BROWSER_FLAG_PREFIX: &str = "--";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Storage
    pub data_dir: PathBuf,
    pub asset_url_prefix: String,

    // Outbound HTTP
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub extra_shortener_hosts: Vec<String>,

    // Screenshots
    pub screenshot_enabled: bool,
    pub screenshot_timeout: Duration,
    pub screenshot_quality: u8,
    pub screenshot_settle_delay: Duration,
    pub chrome_path: Option<String>,
    pub chrome_extra_flags: Vec<String>,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let quality = parse_env_u64("SCREENSHOT_QUALITY", u64::from(DEFAULT_SCREENSHOT_QUALITY))?;
        let screenshot_quality = u8::try_from(quality).map_err(|_| ConfigError::InvalidValue {
            name: "SCREENSHOT_QUALITY".to_string(),
            message: format!("must be between 1 and 100, got {quality}"),
        })?;

        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default("ARCHIVE_DB_PATH", "archive.db")),

            // Storage
            data_dir: PathBuf::from(env_or_default("DATA_DIR", "data")),
            asset_url_prefix: env_or_default("ASSET_URL_PREFIX", "/data/assets"),

            // Outbound HTTP
            request_delay: Duration::from_millis(parse_env_u64("REQUEST_DELAY_MS", 2000)?),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),
            extra_shortener_hosts: parse_list(&env_or_default("EXTRA_SHORTENER_HOSTS", "")),

            // Screenshots
            screenshot_enabled: parse_env_bool("SCREENSHOT_ENABLED", true)?,
            screenshot_timeout: Duration::from_secs(parse_env_u64(
                "SCREENSHOT_TIMEOUT_SECS",
                DEFAULT_SCREENSHOT_TIMEOUT_SECS,
            )?),
            screenshot_quality,
            screenshot_settle_delay: Duration::from_millis(parse_env_u64(
                "SCREENSHOT_SETTLE_MS",
                DEFAULT_SETTLE_DELAY_MS,
            )?),
            chrome_path: optional_env("CHROME_PATH"),
            chrome_extra_flags: parse_browser_flags(&env_or_default("CHROME_EXTRA_FLAGS", "")),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 3000)?,
        })
    }

    /// Configuration suitable for tests: everything under `./data`, a short
    /// request delay and screenshots disabled.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from("archive.db"),
            data_dir: PathBuf::from("data"),
            asset_url_prefix: "/data/assets".to_string(),
            request_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(10),
            extra_shortener_hosts: Vec::new(),
            screenshot_enabled: false,
            screenshot_timeout: Duration::from_secs(DEFAULT_SCREENSHOT_TIMEOUT_SECS),
            screenshot_quality: DEFAULT_SCREENSHOT_QUALITY,
            screenshot_settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            chrome_path: None,
            chrome_extra_flags: Vec::new(),
            web_host: "127.0.0.1".to_string(),
            web_port: 3000,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.screenshot_quality) {
            return Err(ConfigError::InvalidValue {
                name: "SCREENSHOT_QUALITY".to_string(),
                message: format!("must be between 1 and 100, got {}", self.screenshot_quality),
            });
        }
        if self.screenshot_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SCREENSHOT_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.asset_url_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ASSET_URL_PREFIX".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Build the immutable screenshot configuration handed to the capturer.
    #[must_use]
    pub fn screenshot_config(&self) -> ScreenshotConfig {
        ScreenshotConfig {
            enabled: self.screenshot_enabled,
            timeout: self.screenshot_timeout,
            quality: self.screenshot_quality,
            settle_delay: self.screenshot_settle_delay,
            chrome_path: self.chrome_path.clone(),
            extra_flags: self.chrome_extra_flags.clone(),
            ..ScreenshotConfig::default()
        }
    }

    /// Build the redirect resolution rules, including operator-supplied shorteners.
    #[must_use]
    pub fn redirect_config(&self) -> RedirectConfig {
        let mut redirect = RedirectConfig::default();
        redirect
            .shortener_hosts
            .extend(self.extra_shortener_hosts.iter().cloned());
        redirect
    }
}

/// Parse a comma-separated list of browser flags.
///
/// Flags that do not start with `--` are skipped with a warning.
#[must_use]
pub fn parse_browser_flags(raw: &str) -> Vec<String> {
    parse_list(raw)
        .into_iter()
        .filter(|flag| {
            if flag.starts_with(BROWSER_FLAG_PREFIX) {
                true
            } else {
                warn!(flag = %flag, "Skipping unrecognized browser flag");
                false
            }
        })
        .collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
