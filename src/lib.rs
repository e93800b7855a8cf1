//! Mycelium: the crawl engine of a content-discovery pipeline
//!
//! This crate walks the web from a shared frontier of URLs, deduplicates
//! visited locations, extracts structured content and outbound links from
//! fetched pages, and forwards the results to downstream classification
//! stages. All coordination between workers happens through pluggable
//! external stores.

pub mod config;
pub mod crawler;
pub mod identity;
pub mod page;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Mycelium operations
#[derive(Debug, Error)]
pub enum MyceliumError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Frontier unavailable: {0}")]
    FrontierUnavailable(#[source] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Identity rotation error: {0}")]
    Identity(#[from] identity::ChooserError),

    #[error("Worker {worker} stopped abnormally: {message}")]
    Worker { worker: usize, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Failed to parse {path} line {line}: {message}")]
    Input {
        path: String,
        line: usize,
        message: String,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL: {0}")]
    MissingDomain(String),
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, Coordinator, ItemOutcome};
pub use page::{Page, PageParser};
pub use storage::WorkItem;
pub use url::{normalize, normalize_link, DomainFilter};
