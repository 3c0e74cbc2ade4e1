//! Content checks applied to downloaded asset bytes before they are stored.

use super::error::AssetValidationError;

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G'];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8];
const GIF_SIGNATURE: &[u8] = b"GIF8";

/// Number of leading bytes inspected in stylesheets and scripts.
const TEXT_SCAN_LIMIT: usize = 500;

/// Accept or reject asset bytes fetched from `url`.
///
/// Image signatures win over the declared type. Stylesheets and scripts
/// (by URL suffix) are rejected when their first bytes contain control
/// characters other than whitespace. Any other non-empty body is accepted.
///
/// # Errors
///
/// Returns the reason the body was rejected.
pub fn validate_asset(url: &str, body: &[u8]) -> Result<(), AssetValidationError> {
    if body.is_empty() {
        return Err(AssetValidationError::Empty);
    }

    if has_image_signature(body) {
        return Ok(());
    }

    if is_text_asset(url) {
        let head = &body[..body.len().min(TEXT_SCAN_LIMIT)];
        if let Some((offset, &byte)) = head
            .iter()
            .enumerate()
            .find(|(_, &b)| is_disallowed_control(b))
        {
            return Err(AssetValidationError::BinaryContent { byte, offset });
        }
    }

    Ok(())
}

fn has_image_signature(body: &[u8]) -> bool {
    body.len() >= 4
        && (body.starts_with(PNG_SIGNATURE)
            || body.starts_with(JPEG_SIGNATURE)
            || body.starts_with(GIF_SIGNATURE))
}

fn is_text_asset(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with(".css") || lower.ends_with(".js")
}

fn is_disallowed_control(byte: u8) -> bool {
    byte < 0x20 && !matches!(byte, b'\n' | b'\r' | b'\t' | 0x0C)
}
