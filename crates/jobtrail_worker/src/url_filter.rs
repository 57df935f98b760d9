//! URL validity predicate applied at the pipeline boundary.

use url::Url;

/// Hosts that only ever serve error redirects, never job postings.
const BLOCKED_HOSTS: &[&str] = &["errors.edgesuite.net"];

/// Whether the value parses as an absolute http(s) URL.
pub fn is_http_url(value: &str) -> bool {
    match Url::parse(value.trim()) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Whether a harvested URL should be dropped instead of queued.
pub fn should_skip_url(value: &str) -> bool {
    let Ok(parsed) = Url::parse(value.trim()) else {
        return true;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return true;
    }
    match parsed.host_str() {
        Some(host) => BLOCKED_HOSTS.contains(&host),
        None => true,
    }
}
