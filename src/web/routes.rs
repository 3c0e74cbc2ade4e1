use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use url::Url;

use super::AppState;
use crate::db::{count_archive_entries, get_archive_entry, list_archive_entries, ArchiveEntry};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/archive", get(api_list_archives).post(api_create_archive))
        .route("/api/archive/:id", get(api_get_archive))
        .route("/api/archive/:id/content", get(api_archive_content))
        .route("/api/archive/:id/screenshot", get(api_archive_screenshot))
}

async fn health() -> &'static str {
    "OK"
}

// ========== JSON API Routes ==========

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    url: String,
}

async fn api_create_archive(
    State(state): State<AppState>,
    payload: Result<Json<ArchiveRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Cannot parse JSON payload").into_response();
    };

    let url = request.url.trim();
    if url.is_empty() {
        return (StatusCode::BAD_REQUEST, "URL cannot be empty").into_response();
    }
    if !Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https")) {
        return (StatusCode::BAD_REQUEST, "URL must be an absolute http(s) URL").into_response();
    }

    match state.archiver.archive_url(&state.db, url).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => {
            tracing::error!(url = %url, "Failed to archive URL: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to archive URL: {e}"),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiArchivesParams {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    data: T,
    page: u32,
    per_page: u32,
    total: i64,
}

async fn api_list_archives(
    State(state): State<AppState>,
    Query(params): Query<ApiArchivesParams>,
) -> Response {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let offset = i64::from(page - 1) * i64::from(per_page);

    let entries = match list_archive_entries(state.db.pool(), i64::from(per_page), offset).await {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to fetch archive entries: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let total = match count_archive_entries(state.db.pool()).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("Failed to count archive entries: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    Json(ApiResponse {
        data: entries,
        page,
        per_page,
        total,
    })
    .into_response()
}

/// Look up an entry, mapping absence and failures to responses.
async fn find_entry(state: &AppState, id: &str) -> Result<ArchiveEntry, Response> {
    match get_archive_entry(state.db.pool(), id).await {
        Ok(Some(entry)) => Ok(entry),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Archive not found").into_response()),
        Err(e) => {
            tracing::error!(id = %id, "Failed to fetch archive entry: {e:#}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response())
        }
    }
}

async fn api_get_archive(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match find_entry(&state, &id).await {
        Ok(entry) => Json(entry).into_response(),
        Err(response) => response,
    }
}

async fn api_archive_content(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let entry = match find_entry(&state, &id).await {
        Ok(entry) => entry,
        Err(response) => return response,
    };

    // Stored bytes keep the page's original encoding; its own meta charset applies.
    match tokio::fs::read(&entry.storage_path).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            body,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(id = %id, path = %entry.storage_path, "Archived HTML file missing");
            (StatusCode::NOT_FOUND, "Archived content not found").into_response()
        }
        Err(e) => {
            tracing::error!(id = %id, path = %entry.storage_path, "Failed to read archived HTML: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read archived content").into_response()
        }
    }
}

async fn api_archive_screenshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let entry = match find_entry(&state, &id).await {
        Ok(entry) => entry,
        Err(response) => return response,
    };

    let Some(path) = entry.screenshot_path else {
        return (StatusCode::NOT_FOUND, "Screenshot not available").into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, "image/jpeg")], body).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "Screenshot not available").into_response()
        }
        Err(e) => {
            tracing::error!(id = %id, path = %path, "Failed to read screenshot: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read screenshot").into_response()
        }
    }
}
