//! URL handling for KB-Harvest
//!
//! Domain extraction, allow-list matching for the crawl dispatcher and the
//! canonical form used as an article's identity.

mod canonical;

use url::Url;

pub use canonical::normalize_url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use kb_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Docs.Example.com/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("docs.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a domain matches a pattern
///
/// `"example.com"` matches only itself; `"*.example.com"` matches the bare
/// domain and any subdomain of it.
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns true when the URL's host is covered by the allow-list
///
/// An empty allow-list admits every host. URLs without a host are never allowed.
pub fn is_allowed_domain(url: &Url, allowed: &[String]) -> bool {
    let Some(domain) = extract_domain(url) else {
        return false;
    };

    allowed.is_empty()
        || allowed
            .iter()
            .any(|pattern| matches_wildcard(&pattern.to_lowercase(), &domain))
}
