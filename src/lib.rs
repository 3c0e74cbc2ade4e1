//! Page archiver library.
//!
//! Captures a URL into a self-contained local archive: the resolved page with
//! its stylesheets, scripts and images stored alongside it, an optional
//! full-page screenshot, and a SQLite record describing where everything lives.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod archiver;
pub mod config;
pub mod constants;
pub mod db;
pub mod web;
