//! Crawl statistics shared by all engines
//!
//! Counters are plain atomics so every worker can record outcomes without
//! locking. A summary is logged periodically during the run and once when
//! the crawl ends.

use crate::crawler::engine::ItemOutcome;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Items between progress log lines
const PROGRESS_INTERVAL: u64 = 100;

/// Live crawl counters
#[derive(Debug, Default)]
pub struct CrawlStats {
    popped: AtomicU64,
    processed: AtomicU64,
    forwarded: AtomicU64,
    stored: AtomicU64,
    already_visited: AtomicU64,
    exhausted: AtomicU64,
    requeued: AtomicU64,
    filtered: AtomicU64,
    malformed: AtomicU64,
    fetch_failed: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Items taken from the frontier
    pub popped: u64,
    /// Pages fetched and parsed successfully
    pub processed: u64,
    pub forwarded: u64,
    pub stored: u64,
    pub already_visited: u64,
    pub exhausted: u64,
    pub requeued: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub fetch_failed: u64,
    /// Items dropped because of a store or serialization error
    pub errors: u64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one popped item
    ///
    /// # Returns
    ///
    /// The total number of items popped so far, including this one
    pub fn record(&self, outcome: &ItemOutcome) -> u64 {
        let popped = self.popped.fetch_add(1, Ordering::Relaxed) + 1;

        let counter = match outcome {
            ItemOutcome::Exhausted => Some(&self.exhausted),
            ItemOutcome::AlreadyVisited => Some(&self.already_visited),
            ItemOutcome::Requeued => Some(&self.requeued),
            ItemOutcome::Malformed => Some(&self.malformed),
            ItemOutcome::Filtered => Some(&self.filtered),
            ItemOutcome::FetchFailed => Some(&self.fetch_failed),
            ItemOutcome::Unparsed => None,
            ItemOutcome::Forwarded => Some(&self.forwarded),
            ItemOutcome::Stored { .. } => Some(&self.stored),
            ItemOutcome::Dropped => Some(&self.errors),
            ItemOutcome::Cancelled => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if matches!(
            outcome,
            ItemOutcome::Forwarded | ItemOutcome::Stored { .. } | ItemOutcome::Unparsed
        ) {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }

        if popped % PROGRESS_INTERVAL == 0 {
            tracing::info!("Progress: {}", self.snapshot());
        }

        popped
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            popped: load(&self.popped),
            processed: load(&self.processed),
            forwarded: load(&self.forwarded),
            stored: load(&self.stored),
            already_visited: load(&self.already_visited),
            exhausted: load(&self.exhausted),
            requeued: load(&self.requeued),
            filtered: load(&self.filtered),
            malformed: load(&self.malformed),
            fetch_failed: load(&self.fetch_failed),
            errors: load(&self.errors),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} popped, {} processed ({} forwarded, {} stored), {} already visited, \
             {} filtered, {} fetch failures, {} requeued, {} exhausted, {} malformed, {} errors",
            self.popped,
            self.processed,
            self.forwarded,
            self.stored,
            self.already_visited,
            self.filtered,
            self.fetch_failed,
            self.requeued,
            self.exhausted,
            self.malformed,
            self.errors
        )
    }
}
