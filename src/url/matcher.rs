use std::collections::HashSet;
use std::net::IpAddr;
use url::Url;

/// Normalizes a hostname for comparison: lowercase, no trailing root dot
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Extracts the normalized host from a URL
///
/// Returns `None` if the URL has no host.
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .map(normalize_host)
        .filter(|h| !h.is_empty())
}

/// Lists every domain a blacklist entry would have to equal to match `host`
///
/// The host itself comes first, followed by each parent domain down to the
/// last label, so single-label entries such as `localhost` match their
/// subdomains. IP addresses have no parents.
///
/// # Examples
///
/// ```
/// use mycelium::url::domain_suffixes;
///
/// assert_eq!(
///     domain_suffixes("a.B.example.com"),
///     vec!["a.b.example.com", "b.example.com", "example.com", "com"]
/// );
/// assert_eq!(domain_suffixes("localhost"), vec!["localhost"]);
/// ```
pub fn domain_suffixes(host: &str) -> Vec<String> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Vec::new();
    }
    if host.parse::<IpAddr>().is_ok() {
        return vec![host];
    }

    let labels: Vec<&str> = host.split('.').collect();
    let mut suffixes = vec![host.clone()];
    for start in 1..labels.len() {
        suffixes.push(labels[start..].join("."));
    }
    suffixes
}

/// Checks whether `host` equals `entry` or is a subdomain of it
///
/// Matching is label-wise and case-insensitive: `evil.com` matches
/// `sub.evil.com` but never `notevil.com`.
///
/// # Examples
///
/// ```
/// use mycelium::url::matches_domain;
///
/// assert!(matches_domain("evil.com", "evil.com"));
/// assert!(matches_domain("evil.com", "sub.EVIL.com"));
/// assert!(!matches_domain("evil.com", "notevil.com"));
/// ```
pub fn matches_domain(entry: &str, host: &str) -> bool {
    let entry = normalize_host(entry);
    let host = normalize_host(host);
    if entry.is_empty() || host.is_empty() {
        return false;
    }

    match host.strip_suffix(entry.as_str()) {
        Some("") => true,
        Some(prefix) => prefix.ends_with('.'),
        None => false,
    }
}

/// In-process set of excluded domains evaluated before the store blacklist
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    domains: HashSet<String>,
}

impl DomainFilter {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| normalize_host(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Returns true if the URL's host is excluded; hostless URLs never match
    pub fn matches(&self, url: &Url) -> bool {
        extract_host(url).is_some_and(|host| self.matches_host(&host))
    }

    pub fn matches_host(&self, host: &str) -> bool {
        if self.domains.is_empty() {
            return false;
        }
        domain_suffixes(host)
            .iter()
            .any(|suffix| self.domains.contains(suffix))
    }
}
