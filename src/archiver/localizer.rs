//! Download of discovered assets into the capture's asset directory.

use std::path::Path;

use tracing::{debug, warn};

use super::assets::{asset_file_name, AssetReference};
use super::error::AssetError;
use super::transport::RateLimitedTransport;
use super::validator::validate_asset;

/// An asset stored on disk for a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedAsset {
    pub source_url: String,
    pub local_file_name: String,
    pub byte_size: usize,
}

/// Fetch, validate and store every resolvable reference, one at a time.
///
/// Failures are logged and the reference is skipped. Repeated references are
/// fetched again and overwrite the same file. `track` sees every path before
/// anything is written to it.
pub async fn localize_assets<F>(
    transport: &RateLimitedTransport,
    references: &[AssetReference],
    capture_id: &str,
    assets_dir: &Path,
    mut track: F,
) -> Vec<LocalizedAsset>
where
    F: FnMut(&Path) + Send,
{
    let mut localized = Vec::new();

    for reference in references {
        let Some(url) = reference.resolved_url.as_deref() else {
            debug!(raw = %reference.raw_url, "Skipping unresolvable asset reference");
            continue;
        };

        match localize_asset(transport, url, capture_id, assets_dir, &mut track).await {
            Ok(asset) => {
                debug!(
                    url = %url,
                    file = %asset.local_file_name,
                    size = asset.byte_size,
                    "Saved asset"
                );
                localized.push(asset);
            }
            Err(e) => {
                warn!(url = %url, kind = ?reference.kind, error = %e, "Skipping asset");
            }
        }
    }

    localized
}

/// Fetch and store a single asset, reporting the destination to `track`
/// before the write starts.
///
/// # Errors
///
/// Returns an error if the fetch fails, the body is rejected, or the file
/// cannot be written.
pub async fn localize_asset(
    transport: &RateLimitedTransport,
    url: &str,
    capture_id: &str,
    assets_dir: &Path,
    track: &mut (impl FnMut(&Path) + Send),
) -> Result<LocalizedAsset, AssetError> {
    let body = transport.fetch(url, None).await?;

    validate_asset(url, &body).map_err(|e| AssetError::Validation {
        url: url.to_string(),
        source: e,
    })?;

    let local_file_name = asset_file_name(capture_id, url);
    let path = assets_dir.join(&local_file_name);
    track(&path);
    if let Err(e) = tokio::fs::write(&path, &body).await {
        // Don't leave a truncated file behind.
        let _ = tokio::fs::remove_file(&path).await;
        return Err(AssetError::Write { path, source: e });
    }

    Ok(LocalizedAsset {
        source_url: url.to_string(),
        local_file_name,
        byte_size: body.len(),
    })
}
