//! Request headers for direct transfers.
//!
//! Every request carries browser-like headers plus a same-origin
//! `Referer`/`Origin` derived from the URL host. [`HeaderOverrides`] adds or
//! replaces headers for specific domains.

use std::collections::BTreeMap;

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER,
    USER_AGENT,
};
use tracing::warn;
use url::Url;

/// Browser User-Agent sent with every direct transfer.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str = "*/*";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Extra headers keyed by domain.
///
/// A domain entry applies to the host itself and to its subdomains; when
/// several entries match, the longest domain wins for a given header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverrides {
    by_domain: BTreeMap<String, BTreeMap<String, String>>,
}

impl HeaderOverrides {
    /// Builds overrides from a `domain -> (header -> value)` table.
    #[must_use]
    pub fn new(by_domain: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let by_domain = by_domain
            .into_iter()
            .map(|(domain, headers)| (domain.trim().trim_start_matches('.').to_ascii_lowercase(), headers))
            .collect();
        Self { by_domain }
    }

    /// Returns `true` when no overrides are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    fn matching(&self, host: &str) -> Vec<(&str, &BTreeMap<String, String>)> {
        let mut matches: Vec<_> = self
            .by_domain
            .iter()
            .filter(|(domain, _)| {
                host == domain.as_str()
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(|(domain, headers)| (domain.as_str(), headers))
            .collect();
        matches.sort_by_key(|(domain, _)| domain.len());
        matches
    }

    fn apply(&self, host: &str, headers: &mut HeaderMap) {
        for (domain, extra) in self.matching(host) {
            for (name, value) in extra {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => warn!(domain, header = %name, "skipping invalid header override"),
                }
            }
        }
    }
}

/// Builds the header set for a request to `url`.
#[must_use]
pub fn request_headers(url: &str, overrides: &HeaderOverrides) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    let Ok(parsed) = Url::parse(url) else {
        return headers;
    };
    let Some(host) = parsed.host_str() else {
        return headers;
    };

    let origin = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };
    if let Ok(value) = HeaderValue::from_str(&format!("{origin}/")) {
        headers.insert(REFERER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&origin) {
        headers.insert(ORIGIN, value);
    }

    overrides.apply(&host.to_ascii_lowercase(), &mut headers);
    headers
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn overrides(entries: &[(&str, &str, &str)]) -> HeaderOverrides {
        let mut table: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (domain, name, value) in entries {
            table
                .entry((*domain).to_string())
                .or_default()
                .insert((*name).to_string(), (*value).to_string());
        }
        HeaderOverrides::new(table)
    }

    #[test]
    fn test_request_headers_browser_defaults() {
        let headers = request_headers("https://files.example.com/a.zip", &HeaderOverrides::default());
        assert_eq!(headers[USER_AGENT], BROWSER_USER_AGENT);
        assert_eq!(headers[ACCEPT], "*/*");
        assert_eq!(headers[CONNECTION], "keep-alive");
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_request_headers_same_origin_referer() {
        let headers = request_headers("https://files.example.com/a/b.zip?x=1", &HeaderOverrides::default());
        assert_eq!(headers[REFERER], "https://files.example.com/");
        assert_eq!(headers[ORIGIN], "https://files.example.com");
    }

    #[test]
    fn test_request_headers_keeps_explicit_port() {
        let headers = request_headers("http://127.0.0.1:8080/f", &HeaderOverrides::default());
        assert_eq!(headers[ORIGIN], "http://127.0.0.1:8080");
    }

    #[test]
    fn test_request_headers_unparseable_url_has_no_referer() {
        let headers = request_headers("not a url", &HeaderOverrides::default());
        assert!(!headers.contains_key(REFERER));
        assert!(headers.contains_key(USER_AGENT));
    }

    #[test]
    fn test_overrides_apply_to_domain_and_subdomains() {
        let overrides = overrides(&[("example.com", "Referer", "https://portal.example.com/")]);

        let sub = request_headers("https://cdn.example.com/f", &overrides);
        assert_eq!(sub[REFERER], "https://portal.example.com/");

        let exact = request_headers("https://example.com/f", &overrides);
        assert_eq!(exact[REFERER], "https://portal.example.com/");

        let other = request_headers("https://notexample.com/f", &overrides);
        assert_eq!(other[REFERER], "https://notexample.com/");
    }

    #[test]
    fn test_overrides_longest_domain_wins() {
        let overrides = overrides(&[
            ("example.com", "X-Token", "outer"),
            ("cdn.example.com", "X-Token", "inner"),
        ]);
        let headers = request_headers("https://cdn.example.com/f", &overrides);
        assert_eq!(headers["x-token"], "inner");
    }

    #[test]
    fn test_overrides_skip_invalid_header_names() {
        let overrides = overrides(&[("example.com", "bad header", "v")]);
        let headers = request_headers("https://example.com/f", &overrides);
        assert!(!headers.keys().any(|k| k.as_str().contains(' ')));
    }
}
