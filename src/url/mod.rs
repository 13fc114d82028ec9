//! URL handling module for Variant-Harvest
//!
//! This module provides URL normalization (the dedup key for the frontier),
//! page-parameter parsing and rewriting for pagination, and resolution of
//! relative and protocol-relative references against the site origin.

mod normalize;

pub use normalize::normalize_url;

use url::Url;

/// Parses the current page index from a catalog URL
///
/// Returns 1 when the parameter is absent, non-numeric, or zero.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use variant_harvest::url::page_number;
///
/// let url = Url::parse("https://example.com/c?page=4&sort=asc").unwrap();
/// assert_eq!(page_number(&url, "page"), 4);
///
/// let url = Url::parse("https://example.com/c?page=abc").unwrap();
/// assert_eq!(page_number(&url, "page"), 1);
/// ```
pub fn page_number(url: &Url, param: &str) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key == param)
        .and_then(|(_, value)| value.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Returns a copy of `url` with the page parameter set to `page`
///
/// All other query parameters are preserved in their original order. If the
/// parameter appears several times, the first occurrence is rewritten and the
/// rest are dropped.
pub fn with_page_number(url: &Url, param: &str, page: u32) -> Url {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut replaced = false;

    for (key, value) in url.query_pairs() {
        if key == param {
            if !replaced {
                pairs.push((key.to_string(), page.to_string()));
                replaced = true;
            }
        } else {
            pairs.push((key.to_string(), value.to_string()));
        }
    }

    if !replaced {
        pairs.push((param.to_string(), page.to_string()));
    }

    let mut rewritten = url.clone();
    rewritten.query_pairs_mut().clear().extend_pairs(pairs);
    rewritten
}

/// Resolves a link or image reference to an absolute http(s) URL
///
/// Protocol-relative (`//cdn...`), root-relative (`/shop/...`) and bare
/// relative (`shop/...`) references are all resolved against `origin`.
///
/// Returns None if the reference should be excluded:
/// - empty or fragment-only references
/// - javascript:, mailto:, tel:, data: schemes
/// - anything that does not resolve to http or https
pub fn absolutize(reference: &str, origin: &Url) -> Option<String> {
    let reference = reference.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lowered = reference.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let base = origin_root(origin);
    let resolved = if reference.starts_with('/') || reference.contains("://") {
        base.join(reference).ok()?
    } else {
        // Bare relative references hang off the origin root, not the page path
        base.join(&format!("/{}", reference)).ok()?
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Returns the scheme://host[:port]/ root of a URL
pub fn origin_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}
