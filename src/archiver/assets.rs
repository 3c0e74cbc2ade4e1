//! Discovery and rewriting of sub-resource references in captured HTML.
//!
//! Extraction walks the parsed DOM; rewriting streams the original markup
//! through `lol_html` so everything except the rewritten attributes is kept
//! byte for byte. Both passes go through [`resolve_reference`] and
//! [`asset_file_name`], so a reference maps to the same local file in the
//! downloaded assets and in the rewritten markup.

use std::borrow::Cow;

use anyhow::{anyhow, Result};
use lol_html::html_content::Element;
use lol_html::{element, HtmlRewriter, Settings};
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

/// Kind of sub-resource, derived from the owning element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Style,
    Script,
    Image,
    Frame,
}

impl AssetKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "link" => Some(Self::Style),
            "script" => Some(Self::Script),
            "img" => Some(Self::Image),
            "iframe" => Some(Self::Frame),
            _ => None,
        }
    }

    /// Attribute carrying the reference.
    #[must_use]
    pub fn attribute(self) -> &'static str {
        match self {
            Self::Style => "href",
            Self::Script | Self::Image | Self::Frame => "src",
        }
    }
}

/// One reference found in a document. Repeated references are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    /// Attribute value as written in the markup (entity-decoded).
    pub raw_url: String,
    /// Absolute HTTP(S) URL, or `None` when the reference cannot be resolved.
    pub resolved_url: Option<String>,
    pub kind: AssetKind,
}

/// Enumerate the style, script, image and frame references in `html`.
///
/// Unresolvable references (`data:` URIs, other schemes, malformed values)
/// are returned with `resolved_url: None` and never produce an error.
#[must_use]
pub fn extract_assets(html: &str, base: &Url) -> Vec<AssetReference> {
    let document = Html::parse_document(html);
    let mut references = Vec::new();

    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        if let Some(element) = node.value().as_element() {
            if let Some(kind) = AssetKind::from_tag(element.name()) {
                if let Some(raw) = element.attr(kind.attribute()) {
                    references.push(AssetReference {
                        raw_url: raw.to_string(),
                        resolved_url: resolve_reference(base, raw),
                        kind,
                    });
                }
            }
        }
        // Reversed so children are visited in document order.
        stack.extend(node.children().rev());
    }

    references
}

/// Resolve an attribute value against the page URL.
///
/// Returns `None` for empty values, `data:` URIs and anything that does not
/// resolve to an `http` or `https` URL.
#[must_use]
pub fn resolve_reference(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }

    let joined = base.join(raw).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Local file name for an asset: `<capture_id>_<8 hex of sha256(url)>[.ext]`.
#[must_use]
pub fn asset_file_name(capture_id: &str, resolved_url: &str) -> String {
    let digest = Sha256::digest(resolved_url.as_bytes());
    let hash = hex::encode(&digest[..4]);
    format!("{capture_id}_{hash}{}", asset_extension(resolved_url))
}

/// Best-effort extension, including the leading dot, or an empty string.
fn asset_extension(resolved_url: &str) -> String {
    if let Ok(parsed) = Url::parse(resolved_url) {
        let last_segment = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        if let Some((stem, ext)) = last_segment.rsplit_once('.') {
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return format!(".{}", ext.to_ascii_lowercase());
            }
        }
    }

    let lower = resolved_url.to_lowercase();
    let sniffed = if lower.contains(".css") {
        ".css"
    } else if lower.contains(".js") {
        ".js"
    } else if lower.contains(".png") {
        ".png"
    } else if lower.contains(".jpg") || lower.contains(".jpeg") {
        ".jpg"
    } else if lower.contains(".gif") {
        ".gif"
    } else {
        ""
    };
    sniffed.to_string()
}

/// Local URL written into the markup for an asset file.
#[must_use]
pub fn local_asset_path(url_prefix: &str, file_name: &str) -> String {
    format!("{}/{file_name}", url_prefix.trim_end_matches('/'))
}

struct RewriteContext<'a> {
    base: &'a Url,
    capture_id: &'a str,
    url_prefix: &'a str,
}

impl RewriteContext<'_> {
    fn rewrite(
        &self,
        el: &mut Element<'_, '_>,
        attribute: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(raw) = el.get_attribute(attribute) else {
            return Ok(());
        };
        let decoded: Cow<'_, str> = html_escape::decode_html_entities(&raw);
        if let Some(resolved) = resolve_reference(self.base, &decoded) {
            let file_name = asset_file_name(self.capture_id, &resolved);
            el.set_attribute(attribute, &local_asset_path(self.url_prefix, &file_name))?;
        }
        Ok(())
    }
}

/// Point every resolvable asset reference in `html` at its local copy.
///
/// Attributes are rewritten whether or not the asset was downloaded. Bytes
/// outside the rewritten attributes are passed through untouched, so pages
/// in legacy encodings survive intact.
///
/// # Errors
///
/// Returns an error if the HTML rewriter fails.
pub fn rewrite_asset_paths(
    html: &[u8],
    base: &Url,
    capture_id: &str,
    url_prefix: &str,
) -> Result<Vec<u8>> {
    let ctx = RewriteContext {
        base,
        capture_id,
        url_prefix,
    };
    let mut output = Vec::with_capacity(html.len());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("link[href]", |el| ctx.rewrite(el, "href")),
                element!("script[src]", |el| ctx.rewrite(el, "src")),
                element!("img[src]", |el| ctx.rewrite(el, "src")),
                element!("iframe[src]", |el| ctx.rewrite(el, "src")),
            ],
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter
        .write(html)
        .map_err(|e| anyhow!("HtmlRewriter error: {e}"))?;
    rewriter
        .end()
        .map_err(|e| anyhow!("HtmlRewriter end error: {e}"))?;

    Ok(output)
}

/// Page title: `og:title`, then `twitter:title`, then `<title>`. Empty when absent.
#[must_use]
pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);

    for (selector, attr) in [
        ("meta[property='og:title']", "content"),
        ("meta[name='twitter:title']", "content"),
    ] {
        if let Ok(selector) = Selector::parse(selector) {
            if let Some(element) = document.select(&selector).next() {
                if let Some(content) = element.value().attr(attr) {
                    let trimmed = content.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("title") {
        if let Some(element) = document.select(&selector).next() {
            let text: String = element.text().collect();
            return text.trim().to_string();
        }
    }

    String::new()
}
