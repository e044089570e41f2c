//! URL canonicalization so equal requests map to equal cache keys.
//!
//! Every URL the proxy stores or looks up, whether it comes from configuration
//! or from a tool call, passes through these two functions.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    normalize(parsed)
}

/// Resolve `input` against `base` and canonicalize the result.
///
/// Absolute inputs ignore the base; relative ones (`./index.html`, `/app.js`,
/// `?page=2`) are joined onto it.
pub fn resolve(base: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    if trimmed.contains("://") {
        return canonicalize(trimmed);
    }

    let joined = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(joined)
}

fn normalize(mut parsed: url::Url) -> Result<url::Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> url::Url {
        url::Url::parse("https://loans.example.com/app/").unwrap()
    }

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://FONTS.GoogleAPIs.com/css2").unwrap();
        assert_eq!(url.host_str(), Some("fonts.googleapis.com"));
    }

    #[test]
    fn test_canonicalize_remove_fragment_keep_query() {
        let url = canonicalize("https://example.com/path?b=2&a=1#section").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_dot_relative() {
        let url = resolve(&base(), "./index.html").unwrap();
        assert_eq!(url.as_str(), "https://loans.example.com/app/index.html");
    }

    #[test]
    fn test_resolve_root_relative() {
        let url = resolve(&base(), "/manifest.json").unwrap();
        assert_eq!(url.as_str(), "https://loans.example.com/manifest.json");
    }

    #[test]
    fn test_resolve_absolute_ignores_base() {
        let url = resolve(&base(), "https://CDN.tailwindcss.com#x").unwrap();
        assert_eq!(url.as_str(), "https://cdn.tailwindcss.com/");
    }

    #[test]
    fn test_resolve_strips_fragment() {
        let url = resolve(&base(), "./#/loans").unwrap();
        assert_eq!(url.as_str(), "https://loans.example.com/app/");
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&base(), ""), Err(UrlError::Empty)));
    }
}
