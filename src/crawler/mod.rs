//! Crawler module for fetching and forwarding pages
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with identity rotation and streaming parsing
//! - The per-worker crawl engine state machine
//! - Shared crawl statistics
//! - Overall crawl coordination

mod coordinator;
mod engine;
mod fetcher;
mod stats;

pub use coordinator::{
    load_filter, load_identity, load_seeds, pump_ingress, run_crawl, seed, Coordinator,
};
pub use engine::{
    CrawlEngine, Destination, EngineSettings, IdlePolicy, ItemOutcome, Step, StoreSet,
};
pub use fetcher::{build_http_client, FetchError, FetchSettings, Fetched, PageFetcher};
pub use stats::{CrawlStats, StatsSnapshot};

use crate::config::Config;
use crate::MyceliumError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load the seed, identity and blacklist input files
/// 2. Open the configured store and seed an empty frontier
/// 3. Start one crawl engine per configured worker
/// 4. Drain the ingress queue into the frontier while engines run
/// 5. Log the final statistics once every engine has exited
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `cancel` - Cancelled to shut the crawl down
///
/// # Returns
///
/// * `Ok(StatsSnapshot)` - Crawl completed
/// * `Err(MyceliumError)` - Crawl failed
pub async fn crawl(config: Config, cancel: CancellationToken) -> Result<StatsSnapshot, MyceliumError> {
    run_crawl(config, cancel).await
}
