use crate::{UrlError, UrlResult};
use url::Url;

/// Query parameters that never change page content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Produces the canonical form of a page URL
///
/// Articles are deduplicated by this string, so two sitemap entries that differ only
/// in host case, fragment or tracking parameters land on the same row.
///
/// 1. Parse; only http and https are accepted
/// 2. Lowercase the host
/// 3. Empty path becomes `/`
/// 4. Drop the fragment
/// 5. Drop `utm_*` and other tracking parameters, keep the rest in their original order
///
/// Path case and trailing slashes are preserved: documentation servers commonly treat
/// them as significant.
///
/// # Examples
///
/// ```
/// use kb_harvest::url::normalize_url;
///
/// let url = normalize_url("https://DOCS.example.com/Content/Page.htm#top").unwrap();
/// assert_eq!(url.as_str(), "https://docs.example.com/Content/Page.htm");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    if url.path().is_empty() {
        url.set_path("/");
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
