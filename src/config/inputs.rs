//! Loaders for the crawl input files named in `[inputs]`
//!
//! Line-oriented files skip blank lines and `#` comments; errors carry the
//! 1-based line number of the offending entry.

use crate::config::validation::validate_domain_string;
use crate::identity::{ProxyOption, UserAgentOption};
use crate::url::{normalize_host, parse_location};
use crate::ConfigError;
use std::path::Path;
use url::Url;

/// Loads newline-delimited seed URLs
pub fn load_seed_urls(path: &Path) -> Result<Vec<Url>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_lines(path, &content, |line| {
        parse_location(line).map_err(|e| e.to_string())
    })
}

/// Loads the weighted user agent list (`[{"ua": "...", "pct": 90}, ...]`)
pub fn load_user_agents(path: &Path) -> Result<Vec<UserAgentOption>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let options: Vec<UserAgentOption> = serde_json::from_str(&content)?;

    if let Some(i) = options.iter().position(|o| o.user_agent.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "{}: entry {} has an empty user agent",
            path.display(),
            i
        )));
    }
    Ok(options)
}

/// Loads newline-delimited proxy URLs
pub fn load_proxies(path: &Path) -> Result<Vec<ProxyOption>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_lines(path, &content, |line| {
        let option = ProxyOption::parse(line).map_err(|e| e.to_string())?;
        match option.url.scheme() {
            "http" | "https" => Ok(option),
            other => Err(format!("unsupported proxy scheme '{}'", other)),
        }
    })
}

/// Loads newline-delimited blacklisted domains, lowercased
pub fn load_blacklist(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_lines(path, &content, |line| {
        let domain = normalize_host(line);
        validate_domain_string(&domain).map_err(|e| e.to_string())?;
        Ok(domain)
    })
}

fn parse_lines<T, F>(path: &Path, content: &str, mut parse: F) -> Result<Vec<T>, ConfigError>
where
    F: FnMut(&str) -> Result<T, String>,
{
    let mut items = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let item = parse(line).map_err(|message| ConfigError::Input {
            path: path.display().to_string(),
            line: index + 1,
            message,
        })?;
        items.push(item);
    }
    Ok(items)
}
