//! URL capture pipeline.
//!
//! [`Archiver`] ties the steps together: redirect resolution, the primary
//! fetch, asset localization, HTML rewriting, the optional screenshot and the
//! final record.

pub mod assets;
pub mod error;
pub mod localizer;
pub mod pipeline;
pub mod redirect;
pub mod screenshot;
pub mod storage;
pub mod transport;
pub mod validator;

pub use assets::{extract_assets, rewrite_asset_paths, AssetKind, AssetReference};
pub use error::{
    ArchiveError, AssetError, AssetValidationError, FetchError, RedirectBlockedError,
    ResolveError, ScreenshotError,
};
pub use localizer::{localize_assets, LocalizedAsset};
pub use pipeline::{ArchiveStore, Archiver, CaptureResult};
pub use redirect::{AggregatorRule, RedirectConfig, RedirectOutcome, RedirectResolver};
pub use screenshot::{ScreenshotCapturer, ScreenshotConfig};
pub use storage::StorageLayout;
pub use transport::RateLimitedTransport;
pub use validator::validate_asset;
