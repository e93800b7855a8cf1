//! Configuration module for Mycelium
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the seed, user agent, proxy and blacklist input files they
//! point at.
//!
//! # Example
//!
//! ```no_run
//! use mycelium::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mycelium.toml")).unwrap();
//! println!("Crawler will run {} workers", config.crawler.workers);
//! ```

mod inputs;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, FrontierConfig, IdleConfig, InputsConfig, PopModeConfig, StoreBackend,
    StoreConfig,
};

pub use inputs::{load_blacklist, load_proxies, load_seed_urls, load_user_agents};
pub use parser::{load_config, parse_config};
