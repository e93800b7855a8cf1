use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Mycelium
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
    /// Batch mode: exit once the frontier stays empty long enough
    #[serde(default)]
    pub idle: Option<IdleConfig>,
    pub store: StoreConfig,
    #[serde(default)]
    pub inputs: InputsConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent crawl engines
    pub workers: u32,

    /// Items whose retry count exceeds this are dropped
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Bytes of an HTML body fed to the parser before the rest is ignored
    #[serde(rename = "max-body-bytes", default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Retry transient fetch failures in place, consuming retry budget
    #[serde(rename = "retry-fetch-failures", default)]
    pub retry_fetch_failures: bool,

    #[serde(rename = "fetch-retry-backoff-ms", default = "default_fetch_retry_backoff_ms")]
    pub fetch_retry_backoff_ms: u64,

    /// Sent when no user agent rotation is configured
    #[serde(rename = "default-user-agent", default = "default_user_agent")]
    pub default_user_agent: String,

    /// Share one set of rotators across all workers instead of one per worker
    #[serde(rename = "shared-rotators", default = "default_true")]
    pub shared_rotators: bool,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The backoff between in-place fetch retries, if enabled
    pub fn fetch_retry(&self) -> Option<Duration> {
        self.retry_fetch_failures
            .then(|| Duration::from_millis(self.fetch_retry_backoff_ms))
    }
}

/// How a frontier pop waits for work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PopModeConfig {
    #[default]
    Bounded,
    Blocking,
}

/// Frontier pop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierConfig {
    #[serde(rename = "pop-mode", default)]
    pub pop_mode: PopModeConfig,

    /// Wait before an empty bounded pop gives up (milliseconds)
    #[serde(rename = "pop-timeout-ms", default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            pop_mode: PopModeConfig::default(),
            pop_timeout_ms: default_pop_timeout_ms(),
        }
    }
}

/// Idle-exit policy for batch runs
#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    /// Sleep after each empty pop (milliseconds)
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Consecutive empty pops tolerated before exiting
    #[serde(rename = "max-idle")]
    pub max_idle: u32,
}

/// Which external store binding to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
    Redis,
}

/// External store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database path
    pub path: Option<String>,

    /// Redis connection URL
    pub url: Option<String>,

    #[serde(rename = "frontier-key", default = "default_frontier_key")]
    pub frontier_key: String,

    #[serde(rename = "visited-key", default = "default_visited_key")]
    pub visited_key: String,

    #[serde(rename = "blacklist-key", default = "default_blacklist_key")]
    pub blacklist_key: String,

    #[serde(rename = "handoff-key", default = "default_handoff_key")]
    pub handoff_key: String,

    #[serde(rename = "ingress-key", default = "default_ingress_key")]
    pub ingress_key: String,

    /// Forward pages to the handoff queue instead of persisting them
    #[serde(default)]
    pub handoff: bool,

    /// Drain the ingress queue into the frontier while crawling
    #[serde(default = "default_true")]
    pub ingress: bool,

    /// Object store root used when handoff is disabled
    #[serde(rename = "output-dir")]
    pub output_dir: Option<String>,
}

/// Paths to crawl input files
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputsConfig {
    /// Newline-delimited seed URLs
    #[serde(rename = "seed-file")]
    pub seed_file: Option<String>,

    /// JSON list of `{"ua": .., "pct": ..}` user agents
    #[serde(rename = "agents-file")]
    pub agents_file: Option<String>,

    /// Newline-delimited proxy URLs
    #[serde(rename = "proxy-file")]
    pub proxy_file: Option<String>,

    /// Newline-delimited domains excluded from crawling
    #[serde(rename = "blacklist-file")]
    pub blacklist_file: Option<String>,
}

fn default_max_body_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_fetch_retry_backoff_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    concat!("mycelium/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

fn default_pop_timeout_ms() -> u64 {
    5000
}

fn default_frontier_key() -> String {
    "queue".to_string()
}

fn default_visited_key() -> String {
    "visited".to_string()
}

fn default_blacklist_key() -> String {
    "blacklist".to_string()
}

fn default_handoff_key() -> String {
    "fungicide".to_string()
}

fn default_ingress_key() -> String {
    "mycelium-ingress".to_string()
}
