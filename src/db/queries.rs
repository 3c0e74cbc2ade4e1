use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{ArchiveEntry, NewArchiveEntry};

// ========== Archive Entries ==========

/// Insert a new archive entry and return the stored row.
pub async fn insert_archive_entry(pool: &SqlitePool, entry: &NewArchiveEntry) -> Result<ArchiveEntry> {
    sqlx::query(
        r"
        INSERT INTO archive_entries (id, url, title, storage_path, screenshot_path, archived_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&entry.id)
    .bind(&entry.url)
    .bind(&entry.title)
    .bind(&entry.storage_path)
    .bind(&entry.screenshot_path)
    .bind(&entry.archived_at)
    .execute(pool)
    .await
    .context("Failed to insert archive entry")?;

    get_archive_entry(pool, &entry.id)
        .await?
        .context("Archive entry missing after insert")
}

/// Get an archive entry by ID.
pub async fn get_archive_entry(pool: &SqlitePool, id: &str) -> Result<Option<ArchiveEntry>> {
    sqlx::query_as("SELECT * FROM archive_entries WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch archive entry")
}

/// List archive entries, newest first.
pub async fn list_archive_entries(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<ArchiveEntry>> {
    sqlx::query_as(
        r"
        SELECT * FROM archive_entries
        ORDER BY archived_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        ",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list archive entries")
}

/// Get total count of archive entries.
pub async fn count_archive_entries(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM archive_entries")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
