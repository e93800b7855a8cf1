//! Page records and HTML extraction
//!
//! A [`Page`] is built incrementally by [`PageParser`] while an HTML body
//! streams in, then forwarded downstream as a [`PageRecord`] JSON payload.

mod parser;
mod tokens;

pub use parser::{parse_html, parse_stream, PageParser};
pub use tokens::{HtmlToken, HtmlTokens};

use crate::storage::StoreItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Object store extension for persisted pages
pub const PAGE_EXTENSION: &str = ".json";

/// Object store key prefix for persisted pages
pub const PAGE_PREFIX: &str = "pages";

/// Structured content extracted from one fetched HTML page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub location: Url,
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
    pub headings: Vec<String>,
    pub content: Vec<String>,
    /// Absolute, deduplicated, in first-seen order
    pub links: Vec<Url>,
    /// Absolute, deduplicated, in first-seen order
    pub script_links: Vec<Url>,
    pub script_content: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            title: None,
            description: None,
            author: None,
            keywords: Vec::new(),
            headings: Vec::new(),
            content: Vec::new(),
            links: Vec::new(),
            script_links: Vec::new(),
            script_content: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn to_record(&self) -> PageRecord {
        PageRecord::from(self)
    }

    /// Serializes the page in the handoff wire format
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_record())
    }
}

/// Wire form of a [`Page`] on the handoff queue and in the object store
///
/// Absent optional strings are encoded as `""`; `created_at` is epoch
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub description: String,
    pub author: String,
    pub keywords: Vec<String>,
    pub headings: Vec<String>,
    pub content: Vec<String>,
    pub links: Vec<String>,
    pub script_links: Vec<String>,
    pub script_content: Vec<String>,
    pub location: String,
    pub created_at: i64,
}

impl From<&Page> for PageRecord {
    fn from(page: &Page) -> Self {
        let urls = |urls: &[Url]| urls.iter().map(|u| u.to_string()).collect();
        Self {
            title: page.title.clone().unwrap_or_default(),
            description: page.description.clone().unwrap_or_default(),
            author: page.author.clone().unwrap_or_default(),
            keywords: page.keywords.clone(),
            headings: page.headings.clone(),
            content: page.content.clone(),
            links: urls(&page.links),
            script_links: urls(&page.script_links),
            script_content: page.script_content.clone(),
            location: page.location.to_string(),
            created_at: page.created_at.timestamp_millis(),
        }
    }
}

impl StoreItem for Page {
    fn prefix(&self) -> &str {
        PAGE_PREFIX
    }

    fn marshal(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.to_record())
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, label: &str, items: &[T]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(f, "{}:", label)?;
    for item in items {
        writeln!(f, "  - {}", item)?;
    }
    Ok(())
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(30);
        writeln!(f, "PAGE: {}", self.location)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Title: {}", self.title.as_deref().unwrap_or(""))?;
        writeln!(f, "Description: {}", self.description.as_deref().unwrap_or(""))?;
        writeln!(f, "Author: {}", self.author.as_deref().unwrap_or(""))?;

        write_list(f, "Keywords", &self.keywords)?;
        write_list(f, "Headings", &self.headings)?;
        write_list(f, "Content", &self.content)?;
        write_list(f, "Links", &self.links)?;
        write_list(f, "Script Links", &self.script_links)?;

        if !self.script_content.is_empty() {
            writeln!(f, "Script Content:")?;
            for (i, script) in self.script_content.iter().enumerate() {
                writeln!(f, "  [{}] {}", i + 1, script)?;
            }
        }

        writeln!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Page {
        let mut page = Page::new(Url::parse("https://a.com/").unwrap());
        page.title = Some("T".to_string());
        page.headings = vec!["H".to_string()];
        page.links = vec![Url::parse("https://a.com/x").unwrap()];
        page.created_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        page
    }

    #[test]
    fn test_wire_format_fields() {
        let value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();

        assert_eq!(value["title"], "T");
        assert_eq!(value["description"], "");
        assert_eq!(value["author"], "");
        assert_eq!(value["keywords"], serde_json::json!([]));
        assert_eq!(value["links"], serde_json::json!(["https://a.com/x"]));
        assert_eq!(value["script_links"], serde_json::json!([]));
        assert_eq!(value["location"], "https://a.com/");
        assert_eq!(value["created_at"], 1_700_000_000_123i64);
        assert_eq!(value.as_object().unwrap().len(), 11);
    }

    #[test]
    fn test_store_item() {
        let page = sample();
        assert_eq!(page.prefix(), "pages");
        let record: PageRecord = serde_json::from_slice(&page.marshal().unwrap()).unwrap();
        assert_eq!(record, page.to_record());
    }

    #[test]
    fn test_display_lists_only_present_sections() {
        let shown = sample().to_string();
        assert!(shown.starts_with("PAGE: https://a.com/\n"));
        assert!(shown.contains("Title: T\n"));
        assert!(shown.contains("Headings:\n  - H\n"));
        assert!(shown.contains("Links:\n  - https://a.com/x\n"));
        assert!(!shown.contains("Keywords:"));
        assert!(!shown.contains("Script Content:"));
    }
}
