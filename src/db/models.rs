use serde::{Deserialize, Serialize};

/// A completed capture: where its HTML and screenshot live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArchiveEntry {
    pub id: String,
    /// Resolved URL that was captured.
    pub url: String,
    pub title: String,
    /// Path of the rewritten HTML file.
    pub storage_path: String,
    /// Intended screenshot path. The file may be missing if capture failed.
    pub screenshot_path: Option<String>,
    pub archived_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Data for inserting a new archive entry.
#[derive(Debug, Clone)]
pub struct NewArchiveEntry {
    pub id: String,
    pub url: String,
    pub title: String,
    pub storage_path: String,
    pub screenshot_path: Option<String>,
    pub archived_at: String,
}
