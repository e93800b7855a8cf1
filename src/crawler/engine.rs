//! Crawl engine - one worker's consume, check, fetch, forward loop
//!
//! Each engine pops work items from the shared frontier, deduplicates them
//! against the visited set, applies the domain filter and blacklist, fetches
//! and parses the page, then either hands the page downstream or persists it
//! and re-enqueues its links. Engines share nothing but the stores.

use crate::crawler::fetcher::{FetchError, Fetched, PageFetcher};
use crate::crawler::stats::CrawlStats;
use crate::page::{Page, PAGE_EXTENSION};
use crate::storage::{Blacklist, Frontier, Handoff, ObjectStore, VisitedSet, WorkItem};
use crate::url::{extract_host, parse_location, DomainFilter};
use crate::MyceliumError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Exit policy for batch crawls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    /// Sleep after each empty pop
    pub interval: Duration,
    /// Consecutive empty pops tolerated before the engine exits
    pub max_idle: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Items whose retry count exceeds this are dropped unprocessed
    pub max_retries: u32,
    /// `None` keeps the engine running on an empty frontier
    pub idle: Option<IdlePolicy>,
    /// Backoff between in-place retries of transient fetch failures;
    /// `None` drops the item on the first failure
    pub fetch_retry: Option<Duration>,
}

/// Where successfully parsed pages go
#[derive(Clone)]
pub enum Destination {
    /// Serialize and push to the downstream handoff queue
    Handoff(Arc<dyn Handoff>),
    /// Persist to the object store and crawl outbound links
    Store(Arc<dyn ObjectStore>),
}

/// The external stores an engine works against
#[derive(Clone)]
pub struct StoreSet {
    pub frontier: Arc<dyn Frontier>,
    pub visited: Arc<dyn VisitedSet>,
    pub blacklist: Option<Arc<dyn Blacklist>>,
    pub destination: Destination,
}

/// What happened to one popped work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Retry budget used up; dropped without fetching
    Exhausted,
    AlreadyVisited,
    /// Visited set unavailable; pushed back with one more retry consumed
    Requeued,
    /// Location is not an absolute http(s) URL
    Malformed,
    /// Excluded by the domain filter or the store blacklist
    Filtered,
    FetchFailed,
    /// Fetched a textual non-HTML body, which is not parsed
    Unparsed,
    /// Page pushed to the handoff queue
    Forwarded,
    /// Page persisted; `links` new items pushed to the frontier
    Stored { links: usize },
    /// A store or serialization error lost the item
    Dropped,
    /// Shutdown interrupted processing
    Cancelled,
}

/// Result of one [`CrawlEngine::step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The frontier pop returned nothing
    Empty,
    Cancelled,
    Processed(ItemOutcome),
}

/// A single crawl worker
pub struct CrawlEngine {
    worker: usize,
    stores: StoreSet,
    fetcher: PageFetcher,
    settings: EngineSettings,
    filter: DomainFilter,
    stats: Arc<CrawlStats>,
    cancel: CancellationToken,
}

impl CrawlEngine {
    pub fn new(
        worker: usize,
        stores: StoreSet,
        fetcher: PageFetcher,
        settings: EngineSettings,
    ) -> Self {
        Self {
            worker,
            stores,
            fetcher,
            settings,
            filter: DomainFilter::default(),
            stats: Arc::new(CrawlStats::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Excludes matching domains before the store blacklist is consulted
    pub fn with_filter(mut self, filter: DomainFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_stats(mut self, stats: Arc<CrawlStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Runs until cancelled, until the idle policy ends the crawl, or until
    /// the frontier becomes unreachable
    ///
    /// Per-item failures are logged and never end the loop.
    pub async fn run(&self) -> Result<(), MyceliumError> {
        tracing::info!(worker = self.worker, "Engine started");
        let mut idle_count = 0u32;

        loop {
            let step = match self.step().await {
                Ok(step) => step,
                Err(e) => {
                    tracing::error!(worker = self.worker, error = %e, "Engine stopped");
                    return Err(e);
                }
            };

            match step {
                Step::Processed(_) => idle_count = 0,
                Step::Cancelled => break,
                Step::Empty => {
                    let Some(policy) = self.settings.idle else {
                        continue;
                    };

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(policy.interval) => {}
                    }

                    idle_count += 1;
                    if idle_count > policy.max_idle {
                        tracing::info!(
                            worker = self.worker,
                            idle = idle_count,
                            "Frontier idle, engine exiting"
                        );
                        break;
                    }
                }
            }
        }

        tracing::info!(worker = self.worker, "Engine finished");
        Ok(())
    }

    /// Pops one item and processes it
    ///
    /// # Returns
    ///
    /// * `Ok(Step)` - What the pop yielded and how the item was handled
    /// * `Err(MyceliumError::FrontierUnavailable)` - The frontier failed a pop or push
    pub async fn step(&self) -> Result<Step, MyceliumError> {
        let popped = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Step::Cancelled),
            popped = self.stores.frontier.pop() => popped,
        };

        let item = match popped.map_err(MyceliumError::FrontierUnavailable)? {
            Some(item) => item,
            None => return Ok(Step::Empty),
        };

        let outcome = self.process(item).await?;
        self.stats.record(&outcome);
        Ok(Step::Processed(outcome))
    }

    /// Processes one work item
    ///
    /// # Processing Order
    ///
    /// 1. Drop items past the retry budget
    /// 2. Check, then mark, the visited set; a store error requeues the item
    /// 3. Parse the location
    /// 4. Apply the domain filter, then the store blacklist
    /// 5. Fetch and parse the page
    /// 6. Hand the page off, or persist it and push its links
    pub async fn process(&self, item: WorkItem) -> Result<ItemOutcome, MyceliumError> {
        let worker = self.worker;
        let location = item.location.as_str();

        if item.retries > self.settings.max_retries {
            tracing::debug!(worker, location, retries = item.retries, "Retry budget exhausted");
            return Ok(ItemOutcome::Exhausted);
        }

        match self.stores.visited.is_marked(location).await {
            Ok(true) => {
                tracing::debug!(worker, location, "Already visited");
                return Ok(ItemOutcome::AlreadyVisited);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(worker, location, reason = %e, "Visited check failed, requeueing");
                return self.requeue(&item).await;
            }
        }

        if let Err(e) = self.stores.visited.mark(location).await {
            tracing::warn!(worker, location, reason = %e, "Visited mark failed, requeueing");
            return self.requeue(&item).await;
        }

        let url = match parse_location(location) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(worker, location, reason = %e, "Dropping malformed location");
                return Ok(ItemOutcome::Malformed);
            }
        };

        if let Some(outcome) = self.check_excluded(&url).await {
            return Ok(outcome);
        }

        let fetched = match self.fetch(&url, item.retries).await {
            None => {
                tracing::debug!(worker, location, "Fetch interrupted by shutdown");
                return Ok(ItemOutcome::Cancelled);
            }
            Some(Ok(fetched)) => fetched,
            Some(Err(e)) => {
                match &e {
                    FetchError::UnsupportedContentType { .. } => {
                        tracing::debug!(worker, location, reason = %e, "Skipping non-textual page")
                    }
                    _ => tracing::warn!(worker, location, reason = %e, "Fetch failed"),
                }
                return Ok(ItemOutcome::FetchFailed);
            }
        };

        match fetched {
            Fetched::Html(page) => self.forward(page).await,
            Fetched::Text { content_type } => {
                tracing::debug!(worker, location, content_type = %content_type, "Textual page not parsed");
                Ok(ItemOutcome::Unparsed)
            }
        }
    }

    async fn requeue(&self, item: &WorkItem) -> Result<ItemOutcome, MyceliumError> {
        self.stores
            .frontier
            .push(&item.retried())
            .await
            .map_err(MyceliumError::FrontierUnavailable)?;
        Ok(ItemOutcome::Requeued)
    }

    /// Returns the outcome for an excluded location, or `None` to crawl it
    async fn check_excluded(&self, url: &Url) -> Option<ItemOutcome> {
        let worker = self.worker;
        let host = extract_host(url)?;

        if self.filter.matches_host(&host) {
            tracing::debug!(worker, location = %url, reason = "domain filter", "Filtered");
            return Some(ItemOutcome::Filtered);
        }

        let blacklist = self.stores.blacklist.as_ref()?;
        match blacklist.is_blacklisted(&host).await {
            Ok(true) => {
                tracing::debug!(worker, location = %url, reason = "blacklist", "Filtered");
                Some(ItemOutcome::Filtered)
            }
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(worker, location = %url, reason = %e, "Blacklist lookup failed");
                Some(ItemOutcome::Dropped)
            }
        }
    }

    /// Fetches `url`, retrying transient failures in place when enabled
    ///
    /// Each retry consumes one unit of the item's retry budget. Returns
    /// `None` if cancelled.
    async fn fetch(&self, url: &Url, mut retries: u32) -> Option<Result<Fetched, FetchError>> {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.fetcher.fetch(url) => result,
            };

            let transient = matches!(&result, Err(e) if e.is_transient());
            let backoff = match self.settings.fetch_retry {
                Some(backoff) if transient && retries < self.settings.max_retries => backoff,
                _ => return Some(result),
            };

            retries += 1;
            if let Err(e) = &result {
                tracing::info!(
                    worker = self.worker,
                    location = %url,
                    retries,
                    reason = %e,
                    "Retrying transient fetch failure"
                );
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn forward(&self, page: Page) -> Result<ItemOutcome, MyceliumError> {
        let worker = self.worker;

        match &self.stores.destination {
            Destination::Handoff(handoff) => {
                let payload = match page.to_json() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(worker, location = %page.location, reason = %e, "Page serialization failed");
                        return Ok(ItemOutcome::Dropped);
                    }
                };
                if let Err(e) = handoff.hand_off(&payload).await {
                    tracing::warn!(worker, location = %page.location, reason = %e, "Handoff failed");
                    return Ok(ItemOutcome::Dropped);
                }
                tracing::debug!(worker, location = %page.location, "Page handed off");
                Ok(ItemOutcome::Forwarded)
            }
            Destination::Store(store) => {
                match store.store(&page, PAGE_EXTENSION).await {
                    Ok(id) => tracing::debug!(worker, location = %page.location, id = %id, "Page stored"),
                    Err(e) => {
                        tracing::warn!(worker, location = %page.location, reason = %e, "Page store failed");
                        return Ok(ItemOutcome::Dropped);
                    }
                }

                for link in &page.links {
                    self.stores
                        .frontier
                        .push(&WorkItem::new(link.as_str()))
                        .await
                        .map_err(MyceliumError::FrontierUnavailable)?;
                }
                Ok(ItemOutcome::Stored {
                    links: page.links.len(),
                })
            }
        }
    }
}
