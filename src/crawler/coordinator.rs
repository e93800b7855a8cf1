//! Crawler coordinator - wires configuration, stores and engines together
//!
//! This module contains the top-level crawl orchestration, including:
//! - Opening the configured store binding
//! - Seeding an empty frontier
//! - Building identity rotators and the domain filter
//! - Running N crawl engines and the ingress pump
//! - Shutdown and the final statistics summary

use crate::config::{
    load_blacklist, load_proxies, load_seed_urls, load_user_agents, Config, CrawlerConfig,
    FrontierConfig, InputsConfig, PopModeConfig, StoreBackend, StoreConfig,
};
use crate::crawler::engine::{CrawlEngine, Destination, EngineSettings, IdlePolicy, StoreSet};
use crate::crawler::fetcher::{FetchSettings, PageFetcher};
use crate::crawler::stats::{CrawlStats, StatsSnapshot};
use crate::identity::Identity;
use crate::storage::{
    Blacklist, FileStore, Frontier, Handoff, IngressQueue, MemoryStore, PopMode, QueueNames,
    RedisKeys, RedisStore, SqliteStore, StorageResult, VisitedSet, WorkItem,
};
use crate::url::DomainFilter;
use crate::{ConfigError, MyceliumError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pause after an ingress queue error before polling again
const INGRESS_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Pushes `seeds` as fresh work items, but only onto an empty frontier
///
/// A non-empty frontier means an earlier run or another process already
/// seeded it.
///
/// # Returns
///
/// The number of items pushed
pub async fn seed(frontier: &dyn Frontier, seeds: &[Url]) -> StorageResult<usize> {
    let size = frontier.size().await?;
    if size > 0 {
        tracing::info!(size, "Frontier not empty, skipping seeding");
        return Ok(0);
    }

    for url in seeds {
        frontier.push(&WorkItem::new(url.as_str())).await?;
    }
    tracing::info!(count = seeds.len(), "Seeded frontier");
    Ok(seeds.len())
}

/// Moves items from the ingress queue onto the frontier until cancelled
///
/// Malformed payloads are dropped; store errors are logged and retried after
/// a short pause.
///
/// # Returns
///
/// The number of items moved
pub async fn pump_ingress(
    ingress: &dyn IngressQueue,
    frontier: &dyn Frontier,
    cancel: CancellationToken,
) -> u64 {
    let mut moved = 0;

    loop {
        let popped = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            popped = ingress.pop_ingress() => popped,
        };

        let error = match popped {
            Ok(None) => continue,
            Ok(Some(payload)) => match WorkItem::from_json(&payload) {
                Ok(item) => match frontier.push(&item).await {
                    Ok(()) => {
                        moved += 1;
                        continue;
                    }
                    Err(e) => e,
                },
                Err(e) => {
                    tracing::warn!(payload = %payload, reason = %e, "Dropping malformed ingress item");
                    continue;
                }
            },
            Err(e) => e,
        };

        tracing::warn!(reason = %error, "Ingress pump error");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(INGRESS_ERROR_BACKOFF) => {}
        }
    }

    tracing::info!(moved, "Ingress pump stopped");
    moved
}

fn pop_mode(config: &FrontierConfig) -> PopMode {
    match config.pop_mode {
        PopModeConfig::Bounded => PopMode::Bounded(Duration::from_millis(config.pop_timeout_ms)),
        PopModeConfig::Blocking => PopMode::Blocking,
    }
}

fn fetch_settings(config: &CrawlerConfig) -> FetchSettings {
    FetchSettings {
        request_timeout: config.request_timeout(),
        max_body_bytes: config.max_body_bytes,
        default_user_agent: config.default_user_agent.clone(),
    }
}

fn engine_settings(config: &Config) -> EngineSettings {
    EngineSettings {
        max_retries: config.crawler.max_retries,
        idle: config.idle.as_ref().map(|idle| IdlePolicy {
            interval: Duration::from_millis(idle.interval_ms),
            max_idle: idle.max_idle,
        }),
        fetch_retry: config.crawler.fetch_retry(),
    }
}

/// Builds the identity rotators from the agents and proxy files
pub fn load_identity(inputs: &InputsConfig) -> Result<Identity, MyceliumError> {
    let agents = match &inputs.agents_file {
        Some(path) => load_user_agents(Path::new(path))?,
        None => Vec::new(),
    };
    let proxies = match &inputs.proxy_file {
        Some(path) => load_proxies(Path::new(path))?,
        None => Vec::new(),
    };

    tracing::info!(
        user_agents = agents.len(),
        proxies = proxies.len(),
        "Loaded identity rotation options"
    );
    Ok(Identity::from_options(agents, proxies)?)
}

/// Builds the in-process domain filter from the blacklist file
pub fn load_filter(inputs: &InputsConfig) -> Result<DomainFilter, MyceliumError> {
    let domains = match &inputs.blacklist_file {
        Some(path) => load_blacklist(Path::new(path))?,
        None => Vec::new(),
    };
    Ok(DomainFilter::new(domains))
}

/// Seed locations from the seed file, if one is configured
pub fn load_seeds(inputs: &InputsConfig) -> Result<Vec<Url>, MyceliumError> {
    match &inputs.seed_file {
        Some(path) => Ok(load_seed_urls(Path::new(path))?),
        None => Ok(Vec::new()),
    }
}

/// Stores opened for one crawl
struct OpenedStores {
    /// One store set per engine
    workers: Vec<StoreSet>,
    /// Frontier used for seeding and by the ingress pump
    frontier: Arc<dyn Frontier>,
    ingress: Arc<dyn IngressQueue>,
}

fn store_set<S>(store: &Arc<S>, objects: &Option<Arc<FileStore>>) -> StoreSet
where
    S: Frontier + VisitedSet + Blacklist + Handoff + 'static,
{
    let destination = match objects {
        Some(objects) => Destination::Store(objects.clone()),
        None => Destination::Handoff(store.clone()),
    };
    StoreSet {
        frontier: store.clone(),
        visited: store.clone(),
        blacklist: Some(store.clone()),
        destination,
    }
}

/// Opens the configured binding
///
/// Memory and SQLite stores are shared by every engine; Redis gets one
/// connection per engine plus one for seeding and the ingress pump, since a
/// blocking pop occupies its connection.
async fn open_stores(config: &Config) -> Result<OpenedStores, MyceliumError> {
    let store = &config.store;
    let mode = pop_mode(&config.frontier);
    let workers = config.crawler.workers as usize;

    let objects = if store.handoff {
        None
    } else {
        let root = store.output_dir.as_deref().ok_or_else(|| {
            ConfigError::Validation("store.output-dir is required without handoff".to_string())
        })?;
        tracing::info!(root, "Persisting pages to object store");
        Some(Arc::new(FileStore::new(root)))
    };

    match store.backend {
        StoreBackend::Memory => {
            let shared = Arc::new(MemoryStore::new(mode));
            Ok(OpenedStores {
                workers: (0..workers).map(|_| store_set(&shared, &objects)).collect(),
                frontier: shared.clone(),
                ingress: shared,
            })
        }
        StoreBackend::Sqlite => {
            let path = required(store.path.as_deref(), "store.path")?;
            let shared = Arc::new(SqliteStore::open(Path::new(path), queue_names(store), mode)?);
            tracing::info!(path, "Opened SQLite store");
            Ok(OpenedStores {
                workers: (0..workers).map(|_| store_set(&shared, &objects)).collect(),
                frontier: shared.clone(),
                ingress: shared,
            })
        }
        StoreBackend::Redis => {
            let url = required(store.url.as_deref(), "store.url")?;
            let keys = redis_keys(store);

            let mut sets = Vec::with_capacity(workers);
            for _ in 0..workers {
                let conn = Arc::new(RedisStore::connect(url, keys.clone(), mode).await?);
                sets.push(store_set(&conn, &objects));
            }
            let control = Arc::new(RedisStore::connect(url, keys, mode).await?);
            tracing::info!(connections = workers + 1, "Connected to Redis store");

            Ok(OpenedStores {
                workers: sets,
                frontier: control.clone(),
                ingress: control,
            })
        }
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, ConfigError> {
    value.ok_or_else(|| ConfigError::Validation(format!("{} is required for this backend", key)))
}

fn queue_names(store: &StoreConfig) -> QueueNames {
    QueueNames {
        frontier: store.frontier_key.clone(),
        handoff: store.handoff_key.clone(),
        ingress: store.ingress_key.clone(),
    }
}

fn redis_keys(store: &StoreConfig) -> RedisKeys {
    RedisKeys {
        frontier: store.frontier_key.clone(),
        visited: store.visited_key.clone(),
        blacklist: store.blacklist_key.clone(),
        handoff: store.handoff_key.clone(),
        ingress: store.ingress_key.clone(),
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    cancel: CancellationToken,
    stats: Arc<CrawlStats>,
}

impl Coordinator {
    /// Creates a coordinator; cancelling `cancel` shuts the crawl down
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            stats: Arc::new(CrawlStats::new()),
        }
    }

    /// Counters shared by every engine of this crawl
    pub fn stats(&self) -> Arc<CrawlStats> {
        self.stats.clone()
    }

    /// Runs the crawl to completion
    ///
    /// The crawl ends when every engine has exited: through cancellation,
    /// through the idle policy, or because its frontier became unreachable.
    ///
    /// # Returns
    ///
    /// * `Ok(StatsSnapshot)` - Final counters
    /// * `Err(MyceliumError)` - Startup failed, or an engine stopped on a fatal error
    pub async fn run(&self) -> Result<StatsSnapshot, MyceliumError> {
        let start_time = Instant::now();
        let config = &self.config;

        let seeds = load_seeds(&config.inputs)?;
        let identity = load_identity(&config.inputs)?;
        let filter = load_filter(&config.inputs)?;
        if !filter.is_empty() {
            tracing::info!(domains = filter.len(), "Loaded domain filter");
        }

        let stores = open_stores(config).await?;
        seed(stores.frontier.as_ref(), &seeds)
            .await
            .map_err(MyceliumError::FrontierUnavailable)?;

        let fetch_settings = fetch_settings(&config.crawler);
        let engine_settings = engine_settings(config);

        let engines_cancel = self.cancel.child_token();
        let mut handles = Vec::with_capacity(stores.workers.len());
        for (worker, store_set) in stores.workers.into_iter().enumerate() {
            let identity = if config.crawler.shared_rotators {
                identity.clone()
            } else {
                identity.isolated()?
            };
            let fetcher = PageFetcher::new(identity, fetch_settings.clone())?;
            let engine = CrawlEngine::new(worker, store_set, fetcher, engine_settings.clone())
                .with_filter(filter.clone())
                .with_stats(self.stats.clone())
                .with_cancellation(engines_cancel.child_token());

            handles.push(tokio::spawn(async move { engine.run().await }));
        }
        tracing::info!(workers = handles.len(), "Started crawl engines");

        let pump_cancel = self.cancel.child_token();
        let pump = if config.store.ingress {
            let ingress = stores.ingress.clone();
            let frontier = stores.frontier.clone();
            let cancel = pump_cancel.clone();
            Some(tokio::spawn(async move {
                pump_ingress(ingress.as_ref(), frontier.as_ref(), cancel).await
            }))
        } else {
            None
        };

        let mut first_error = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(MyceliumError::Worker {
                    worker,
                    message: e.to_string(),
                }),
            };
            if let Err(e) = result {
                tracing::error!(worker, error = %e, "Engine failed");
                first_error.get_or_insert(e);
            }
        }

        pump_cancel.cancel();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                tracing::warn!(error = %e, "Ingress pump task failed");
            }
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            "Crawl finished in {:?}: {}",
            start_time.elapsed(),
            snapshot
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }
}

/// Runs a complete crawl operation
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `cancel` - Cancelled to stop the crawl (e.g. on Ctrl+C)
///
/// # Example
///
/// ```no_run
/// use mycelium::config::load_config;
/// use mycelium::crawler::run_crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("mycelium.toml"))?;
/// let stats = run_crawl(config, CancellationToken::new()).await?;
/// println!("{}", stats);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    cancel: CancellationToken,
) -> Result<StatsSnapshot, MyceliumError> {
    Coordinator::new(config, cancel).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn urls(list: &[&str]) -> Vec<Url> {
        list.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let store = MemoryStore::new(PopMode::Bounded(Duration::from_millis(10)));
        let seeds = urls(&["https://a.com/", "https://b.com/"]);

        assert_eq!(seed(&store, &seeds).await.unwrap(), 2);
        assert_eq!(seed(&store, &seeds).await.unwrap(), 0);
        assert_eq!(store.size().await.unwrap(), 2);
        assert_eq!(store.frontier_items()[0], WorkItem::new("https://a.com/"));
    }

    #[tokio::test]
    async fn test_pump_moves_valid_items_and_drops_malformed() {
        let store = Arc::new(MemoryStore::new(PopMode::Bounded(Duration::from_millis(10))));
        store
            .push_ingress(r#"{"location": "https://a.com/", "retries": 2}"#)
            .await
            .unwrap();
        store.push_ingress("not json").await.unwrap();
        store
            .push_ingress(r#"{"location": "https://b.com/", "retries": 0}"#)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let pump = {
            let store = store.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pump_ingress(&*store, &*store, cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(pump.await.unwrap(), 2);

        let items = store.frontier_items();
        assert_eq!(
            items,
            vec![
                WorkItem {
                    location: "https://a.com/".to_string(),
                    retries: 2,
                },
                WorkItem::new("https://b.com/"),
            ]
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = parse_config(
            r#"
[crawler]
workers = 2
max-retries = 4
request-timeout-ms = 2500
retry-fetch-failures = true
fetch-retry-backoff-ms = 50

[frontier]
pop-mode = "bounded"
pop-timeout-ms = 300

[idle]
interval-ms = 10
max-idle = 3

[store]
backend = "memory"
handoff = true
"#,
        )
        .unwrap();

        assert_eq!(pop_mode(&config.frontier), PopMode::Bounded(Duration::from_millis(300)));

        let engine = engine_settings(&config);
        assert_eq!(engine.max_retries, 4);
        assert_eq!(engine.fetch_retry, Some(Duration::from_millis(50)));
        assert_eq!(
            engine.idle,
            Some(IdlePolicy {
                interval: Duration::from_millis(10),
                max_idle: 3,
            })
        );

        let fetch = fetch_settings(&config.crawler);
        assert_eq!(fetch.request_timeout, Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_coordinator_idle_exit_with_empty_seed_file() {
        let output = TempDir::new().unwrap();
        let mut seeds = NamedTempFile::new().unwrap();
        writeln!(seeds, "# nothing to crawl").unwrap();

        let config = parse_config(&format!(
            r#"
[crawler]
workers = 2
max-retries = 1
request-timeout-ms = 1000

[frontier]
pop-timeout-ms = 10

[idle]
interval-ms = 5
max-idle = 2

[store]
backend = "memory"
ingress = false
output-dir = "{}"

[inputs]
seed-file = "{}"
"#,
            output.path().display(),
            seeds.path().display()
        ))
        .unwrap();

        let coordinator = Coordinator::new(config, CancellationToken::new());
        let result = tokio::time::timeout(Duration::from_secs(5), coordinator.run()).await;
        let snapshot = result.unwrap().unwrap();
        assert_eq!(snapshot.popped, 0);
    }

    #[tokio::test]
    async fn test_missing_seed_file_fails_startup() {
        let config = parse_config(
            r#"
[crawler]
workers = 1
max-retries = 1
request-timeout-ms = 1000

[store]
backend = "memory"
handoff = true

[inputs]
seed-file = "/nonexistent/seeds.txt"
"#,
        )
        .unwrap();

        let result = Coordinator::new(config, CancellationToken::new()).run().await;
        assert!(matches!(result, Err(MyceliumError::Config(ConfigError::Io(_)))));
    }
}
