use crate::UrlError;
use url::{ParseError, Url};

/// Resolves a possibly-relative reference against a page's own location
///
/// # Resolution Steps
///
/// 1. Trim surrounding whitespace from the reference
/// 2. Parse it; if it already carries a non-empty host, return it as-is
/// 3. Otherwise join it against `location` (RFC 3986 reference resolution)
///    and re-parse the joined result
/// 4. Reject the result if it still has no host (`mailto:`, `javascript:`,
///    `data:` and friends)
///
/// # Arguments
///
/// * `location` - The absolute location of the page the reference was found on
/// * `reference` - The raw `href`/`src` attribute value
///
/// # Returns
///
/// * `Ok(Url)` - An absolute URL with a host
/// * `Err(UrlError)` - The reference could not be resolved
///
/// # Examples
///
/// ```
/// use mycelium::url::normalize_link;
/// use url::Url;
///
/// let page = Url::parse("https://a.com/x").unwrap();
/// assert_eq!(normalize_link(&page, "b").unwrap().as_str(), "https://a.com/b");
/// assert_eq!(
///     normalize_link(&page, "https://other.com/y").unwrap().as_str(),
///     "https://other.com/y"
/// );
/// ```
pub fn normalize_link(location: &Url, reference: &str) -> Result<Url, UrlError> {
    let trimmed = reference.trim();

    match Url::parse(trimmed) {
        Ok(url) if has_host(&url) => return Ok(url),
        // Hostless absolute URLs still get a chance through the join below;
        // the host check afterwards rejects them.
        Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => {}
        Err(e) => return Err(UrlError::Parse(format!("{}: {}", trimmed, e))),
    }

    let joined = location
        .join(trimmed)
        .map_err(|e| UrlError::Parse(format!("{} against {}: {}", trimmed, location, e)))?;

    let reparsed = Url::parse(joined.as_str())
        .map_err(|e| UrlError::Parse(format!("{}: {}", joined, e)))?;

    if !has_host(&reparsed) {
        return Err(UrlError::MissingDomain(reparsed.to_string()));
    }

    Ok(reparsed)
}

/// String form of [`normalize_link`] taking the page location unparsed
pub fn normalize(location: &str, reference: &str) -> Result<Url, UrlError> {
    let base = Url::parse(location.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", location, e)))?;
    normalize_link(&base, reference)
}

/// Parses a frontier location into a crawlable URL
///
/// Only `http` and `https` locations with a host are crawlable.
pub fn parse_location(location: &str) -> Result<Url, UrlError> {
    let url = Url::parse(location).map_err(|e| UrlError::Parse(format!("{}: {}", location, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if !has_host(&url) {
        return Err(UrlError::MissingDomain(location.to_string()));
    }

    Ok(url)
}

fn has_host(url: &Url) -> bool {
    url.host_str().is_some_and(|h| !h.is_empty())
}
