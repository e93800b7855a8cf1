//! Storage traits and error types
//!
//! Each trait is one capability of the shared external store. A backend may
//! implement any subset; the crawl engine only asks for the capabilities it
//! uses.

use crate::storage::WorkItem;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// How a queue pop waits when the queue is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopMode {
    /// Wait at most this long, then report an empty queue
    Bounded(Duration),
    /// Wait until an item arrives
    Blocking,
}

/// Shared queue of pending crawl candidates
///
/// Delivery is at-least-once: consumers must tolerate seeing a location
/// more than once.
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Appends an item to the tail of the queue
    async fn push(&self, item: &WorkItem) -> StorageResult<()>;

    /// Removes the head of the queue, waiting according to the store's [`PopMode`]
    ///
    /// Returns `Ok(None)` when a bounded wait elapses with the queue still empty.
    ///
    /// # Cancellation
    ///
    /// Dropping the future before it resolves is safe for the in-process
    /// binding. External bindings may already have removed an item on the
    /// server side (a Redis `BLPOP` answered after the client gave up, or a
    /// SQLite claim running on the blocking pool); that item is lost. The
    /// window is one item per abandoned pop and only opens at shutdown.
    async fn pop(&self) -> StorageResult<Option<WorkItem>>;

    /// Number of queued items
    async fn size(&self) -> StorageResult<u64>;
}

/// Monotonic record of processed locations, keyed by exact location string
#[async_trait]
pub trait VisitedSet: Send + Sync {
    async fn mark(&self, location: &str) -> StorageResult<()>;

    async fn is_marked(&self, location: &str) -> StorageResult<bool>;
}

/// Domains excluded from crawling
#[async_trait]
pub trait Blacklist: Send + Sync {
    /// True if `host` equals a listed domain or is a subdomain of one
    async fn is_blacklisted(&self, host: &str) -> StorageResult<bool>;
}

/// One-way channel forwarding serialized pages downstream
#[async_trait]
pub trait Handoff: Send + Sync {
    async fn hand_off(&self, payload: &str) -> StorageResult<()>;
}

/// Work items produced by downstream services for re-crawling
///
/// Payloads are raw JSON; the consumer decides what to do with malformed ones.
#[async_trait]
pub trait IngressQueue: Send + Sync {
    async fn push_ingress(&self, payload: &str) -> StorageResult<()>;

    async fn pop_ingress(&self) -> StorageResult<Option<String>>;
}

/// Something that can be written to an [`ObjectStore`]
pub trait StoreItem {
    /// Key namespace for items of this kind
    fn prefix(&self) -> &str;

    fn marshal(&self) -> serde_json::Result<Vec<u8>>;
}

/// Persistent keyed storage for crawl output
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes the item under a fresh key and returns that key
    async fn store(&self, item: &(dyn StoreItem + Sync), extension: &str) -> StorageResult<String>;

    /// Reads back the bytes written under `id`
    async fn retrieve(&self, id: &str, extension: &str) -> StorageResult<Vec<u8>>;
}
